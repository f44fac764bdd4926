//! Property-based tests for discrepancy detection and correction policy.
//!
//! Small value pools keep field collisions common, so generated pairs cover
//! full agreement, partial drift, and identity drift in every run.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use ensina_session::consistency::{
    detect_discrepancies, recommend, select_strategy, FIELD_USER_EXISTENCE,
};
use ensina_session::{CorrectionStrategy, Recommendation, Severity};
use ensina_types::{Role, User};

// =============================================================================
// Strategies
// =============================================================================

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Aluno), Just(Role::Instrutor), Just(Role::Admin)]
}

fn arb_user() -> impl Strategy<Value = User> {
    (
        0u32..8,
        0u32..4,
        0u32..4,
        arb_role(),
        proptest::option::of(0u32..3),
        proptest::option::of(0u32..3),
        proptest::option::of(0u32..3),
    )
        .prop_map(|(id, name, email, role, avatar, phone, bio)| {
            let at = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
            User {
                id: format!("u-{id}"),
                name: format!("User {name}"),
                email: format!("user{email}@ensina.app"),
                role,
                created_at: at,
                updated_at: at,
                avatar_path: avatar.map(|n| format!("avatars/a{n}.png")),
                phone: phone.map(|n| format!("+55 11 9{n}000-0000")),
                bio: bio.map(|n| format!("student {n}")),
            }
        })
}

/// One source's view: usually a user, sometimes logged out.
fn arb_view() -> impl Strategy<Value = Option<User>> {
    proptest::option::weighted(0.8, arb_user())
}

// =============================================================================
// Detection properties
// =============================================================================

proptest! {
    /// Swapping the sides swaps the values but never the findings.
    #[test]
    fn prop_detection_is_symmetric(a in arb_view(), b in arb_view()) {
        let forward: Vec<_> = detect_discrepancies("cache", a.as_ref(), "server", b.as_ref())
            .into_iter()
            .map(|d| (d.field, d.severity, d.left, d.right))
            .collect();
        let backward: Vec<_> = detect_discrepancies("server", b.as_ref(), "cache", a.as_ref())
            .into_iter()
            .map(|d| (d.field, d.severity, d.right, d.left))
            .collect();
        prop_assert_eq!(forward, backward);
    }

    /// Re-running detection over unchanged views reproduces the report.
    #[test]
    fn prop_detection_is_deterministic(a in arb_view(), b in arb_view()) {
        let first = detect_discrepancies("cache", a.as_ref(), "server", b.as_ref());
        let second = detect_discrepancies("cache", a.as_ref(), "server", b.as_ref());
        prop_assert_eq!(first, second);
    }

    /// A source always agrees with itself, logged out included.
    #[test]
    fn prop_identical_views_always_agree(a in arb_view()) {
        let found = detect_discrepancies("cache", a.as_ref(), "server", a.as_ref());
        prop_assert!(found.is_empty());
    }

    /// A user visible on one side only is exactly one critical finding.
    #[test]
    fn prop_one_sided_presence_is_a_single_critical(user in arb_user()) {
        let found = detect_discrepancies("cache", Some(&user), "server", None);
        prop_assert_eq!(found.len(), 1);
        prop_assert_eq!(found[0].field.as_str(), FIELD_USER_EXISTENCE);
        prop_assert_eq!(found[0].severity, Severity::Critical);
        prop_assert_eq!(recommend(&found), Recommendation::Reload);
    }

    /// Every finding is graded by its field class, and fields never repeat.
    #[test]
    fn prop_severity_matches_the_field_class(a in arb_user(), b in arb_user()) {
        let known = ["id", "name", "role", "email", "avatar_path", "phone", "bio"];
        let found = detect_discrepancies("cache", Some(&a), "server", Some(&b));
        prop_assert!(found.len() <= known.len());
        let mut seen = std::collections::HashSet::new();
        for d in &found {
            prop_assert!(known.contains(&d.field.as_str()), "unexpected field {}", d.field);
            prop_assert!(seen.insert(d.field.clone()), "field {} repeated", d.field);
            let expected = match d.field.as_str() {
                "id" => Severity::Critical,
                "name" | "role" | "email" => Severity::Warning,
                _ => Severity::Info,
            };
            prop_assert_eq!(d.severity, expected);
        }
    }
}

// =============================================================================
// Policy properties
// =============================================================================

proptest! {
    /// Any critical finding outranks volume in the recommendation.
    #[test]
    fn prop_critical_findings_always_recommend_reload(a in arb_view(), b in arb_view()) {
        let found = detect_discrepancies("cache", a.as_ref(), "server", b.as_ref());
        let has_critical = found.iter().any(|d| d.severity == Severity::Critical);
        match recommend(&found) {
            Recommendation::Reload => prop_assert!(has_critical),
            Recommendation::ManualCheck => {
                prop_assert!(!has_critical);
                prop_assert!(found.len() > 3);
            }
            Recommendation::Sync => {
                prop_assert!(!has_critical);
                prop_assert!(found.len() <= 3);
            }
        }
    }

    /// Two findings or fewer always leave an automated strategy applicable.
    #[test]
    fn prop_small_reports_stay_automated(a in arb_view(), b in arb_view()) {
        let found = detect_discrepancies("cache", a.as_ref(), "server", b.as_ref());
        if found.len() <= 2 {
            prop_assert_ne!(
                select_strategy(&found),
                CorrectionStrategy::ManualIntervention
            );
        }
    }

    /// Disagreement on the identifier always forces the full reload path.
    #[test]
    fn prop_identity_drift_forces_a_complete_reload(a in arb_user(), b in arb_user()) {
        prop_assume!(a.id != b.id);
        let found = detect_discrepancies("cache", Some(&a), "server", Some(&b));
        prop_assert_eq!(select_strategy(&found), CorrectionStrategy::CompleteReload);
    }
}
