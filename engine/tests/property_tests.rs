use proptest::prelude::*;
use tapwise_engine::conductor::{detect_finish, FinishMatch};
use tapwise_engine::config::Config;
use tapwise_engine::skills::keyword_score;

proptest! {
    #[test]
    fn test_config_parsing_round_trip(
        log_level in "error|warn|info|debug|trace",
        default_provider in "ollama|openai",
        max_steps in 1..=200usize,
        max_errors in 1..=10usize,
        keyword_threshold in 0.0..=1.0f64,
        fast_path in 0.0..=1.0f64,
        max_retries in 0..=5u32,
    ) {
        let baseline_toml = r#"
[core]
log_level = "info"

[llm]
default_provider = "ollama"
"#;
        let mut config = Config::from_toml_str(baseline_toml)
            .expect("Failed to parse baseline config");

        config.core.log_level = log_level;
        config.llm.default_provider = default_provider;
        config.llm.max_retries = max_retries;
        config.agent.max_steps = max_steps;
        config.agent.max_consecutive_errors = max_errors;
        config.skills.keyword_threshold = keyword_threshold;
        config.skills.fast_path_confidence = fast_path;

        let serialized = toml::to_string(&config).expect("Failed to serialize config");
        let reparsed = Config::from_toml_str(&serialized).expect("Failed to reparse config");

        prop_assert_eq!(&reparsed.core.log_level, &config.core.log_level);
        prop_assert_eq!(&reparsed.llm.default_provider, &config.llm.default_provider);
        prop_assert_eq!(reparsed.llm.max_retries, config.llm.max_retries);
        prop_assert_eq!(reparsed.agent.max_steps, config.agent.max_steps);
        prop_assert_eq!(
            reparsed.agent.max_consecutive_errors,
            config.agent.max_consecutive_errors
        );
        prop_assert_eq!(reparsed.skills.keyword_threshold, config.skills.keyword_threshold);
        prop_assert_eq!(reparsed.skills.fast_path_confidence, config.skills.fast_path_confidence);
    }

    #[test]
    fn test_keyword_score_is_bounded(
        query in "[a-zA-Z ]{0,60}",
        keywords in prop::collection::vec("[a-zA-Z ]{0,20}", 0..6),
    ) {
        let score = keyword_score(&query, &keywords);
        prop_assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
    }

    #[test]
    fn test_only_exact_keyword_scores_one(
        query in "[a-z]{2,12}( [a-z]{2,12}){0,4}",
        keywords in prop::collection::vec("[a-z]{2,12}", 1..5),
    ) {
        let score = keyword_score(&query, &keywords);
        if keywords.iter().any(|k| *k == query) {
            prop_assert_eq!(score, 1.0);
        } else {
            prop_assert!(score < 1.0);
        }
    }

    #[test]
    fn test_finished_with_trailing_punctuation_is_detected(
        padding in "[ \t\n]{0,3}",
        suffix in "[.! ]{1,4}",
        upper in any::<bool>(),
    ) {
        let word = if upper { "FINISHED" } else { "Finished" };
        let text = format!("{}{}{}", padding, word, suffix);
        let matched = detect_finish(&text);
        prop_assert!(
            matches!(matched, Some(FinishMatch::Exact) | Some(FinishMatch::Punctuated)),
            "{:?} -> {:?}", text, matched
        );
    }

    #[test]
    fn test_text_without_the_word_never_finishes(text in "[a-eg-z0-9 .,!-]{0,120}") {
        // No 'f', so "finished" cannot appear
        prop_assert_eq!(detect_finish(&text), None);
    }

    #[test]
    fn test_long_responses_need_an_explicit_prefix(filler in "[a-eg-z][a-eg-z ]{59,99}") {
        let text = format!("{} finished", filler);
        prop_assert_eq!(detect_finish(&text), None);
    }
}
