use proptest::prelude::*;
use serde_json::json;
use taskflow_core::state_machine::TaskState;
use taskflow_core::task::TaskId;
use taskflow_core::triggers::{self, UpstreamStates};

fn terminal_state_strategy() -> impl Strategy<Value = TaskState> {
    prop_oneof![
        any::<i64>().prop_map(|v| TaskState::success(json!(v))),
        "[a-z]{1,8}".prop_map(|m| TaskState::failed(m)),
        "[a-z]{1,8}".prop_map(|m| TaskState::skipped(m)),
        "[a-z]{1,8}".prop_map(|m| TaskState::timed_out(m)),
        any::<i64>().prop_map(|v| TaskState::Cached {
            result: json!(v),
            cached_at: chrono::Utc::now(),
        }),
    ]
}

fn upstream_strategy() -> impl Strategy<Value = UpstreamStates> {
    prop::collection::vec(terminal_state_strategy(), 0..8)
        .prop_map(|states| states.into_iter().map(|s| (TaskId::new(), s)).collect())
}

proptest! {
    /// Property: all_successful holds exactly when no upstream failed or timed out
    #[test]
    fn all_successful_matches_failure_free_upstream(upstream in upstream_strategy()) {
        let expected = upstream.values().all(|s| !s.is_failed());
        prop_assert_eq!(triggers::all_successful().evaluate(&upstream), expected);
    }

    /// Property: all_finished and always_run accept any terminal upstream; manual_only accepts none
    #[test]
    fn finished_triggers_accept_everything(upstream in upstream_strategy()) {
        prop_assert!(triggers::all_finished().evaluate(&upstream));
        prop_assert!(triggers::always_run().evaluate(&upstream));
        prop_assert!(!triggers::manual_only().evaluate(&upstream));
    }

    /// Property: any_failed is the negation of all_successful on non-empty upstream
    #[test]
    fn any_failed_complements_all_successful(upstream in upstream_strategy()) {
        prop_assume!(!upstream.is_empty());
        prop_assert_eq!(
            triggers::any_failed().evaluate(&upstream),
            !triggers::all_successful().evaluate(&upstream)
        );
    }

    /// Property: triggers are pure; repeated evaluation gives the same answer
    #[test]
    fn triggers_are_deterministic(upstream in upstream_strategy()) {
        for trigger in [triggers::all_successful(), triggers::all_failed(), triggers::any_successful()] {
            prop_assert_eq!(trigger.evaluate(&upstream), trigger.evaluate(&upstream));
        }
    }
}
