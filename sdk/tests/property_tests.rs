use proptest::prelude::*;
use sdk::action::Action;
use sdk::errors::{EngineError, ErrorExt};

proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Catalog(error_str.clone()),
            EngineError::ModelProvider(error_str.clone()),
            EngineError::Action(sdk::ActionError::TargetNotFound(error_str.clone())),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            // Hints are static; raw error text must never leak into them
            if error_str.len() > 12 {
                prop_assert!(!hint.contains(&error_str));
            }
        }
    }
}

proptest! {
    #[test]
    fn test_tap_round_trips_through_json(x in 0..4000u32, y in 0..4000u32) {
        let action = Action::Tap { x, y };
        let json = serde_json::to_string(&action).unwrap();
        let parsed: Action = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, action);
    }

    #[test]
    fn test_typed_text_is_valid_unless_empty(text in "\\PC{0,40}") {
        let action = Action::Type { text: text.clone() };
        prop_assert_eq!(action.validate().is_ok(), !text.is_empty());
    }
}
