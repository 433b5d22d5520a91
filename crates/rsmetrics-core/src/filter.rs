//! Window and catalog filtering.
//!
//! All filters are stable: they keep the input order of the rows they
//! retain, so time bucketing downstream sees the same sequence. Applying a
//! filter twice gives the same result as applying it once.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{Item, Recommendation, ResourceRef, Timestamped, User, UserAction, Window};

/// Keep rows whose timestamp falls inside the window.
pub fn within_window<T: Timestamped>(rows: Vec<T>, window: &Window) -> Vec<T> {
    rows.into_iter()
        .filter(|row| window.contains(row.timestamp()))
        .collect()
}

/// Set of active item ids, used for membership checks.
pub fn item_ids(items: &[Item]) -> HashSet<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

/// Whether a resource reference is allowed by the active catalog.
///
/// The unknown sentinel always passes.
pub fn in_catalog(resource: &ResourceRef, items: &HashSet<&str>) -> bool {
    match resource {
        ResourceRef::Unknown => true,
        ResourceRef::Known(id) => items.contains(id.as_str()),
    }
}

/// Derive the registered users seen in a set of actions.
///
/// Users appear in order of their first action. Their accessed resources
/// are the union of known source and target ids.
pub fn derive_users(actions: &[UserAction]) -> Vec<User> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut users: Vec<User> = Vec::new();
    for action in actions.iter().filter(|a| a.registered) {
        let pos = *index.entry(action.user_id.as_str()).or_insert_with(|| {
            users.push(User {
                id: action.user_id.clone(),
                accessed_resources: BTreeSet::new(),
            });
            users.len() - 1
        });
        for resource in [&action.source_resource_id, &action.target_resource_id] {
            if let Some(id) = resource.id() {
                users[pos].accessed_resources.insert(id.to_string());
            }
        }
    }
    users
}

/// Keep actions whose source and target are both in the catalog (or unknown).
pub fn filter_user_actions(actions: &[UserAction], items: &[Item]) -> Vec<UserAction> {
    let ids = item_ids(items);
    actions
        .iter()
        .filter(|a| in_catalog(&a.source_resource_id, &ids) && in_catalog(&a.target_resource_id, &ids))
        .cloned()
        .collect()
}

/// Keep recommendations whose item is in the catalog (or unknown) and whose
/// user is either anonymous or one of the active users.
pub fn filter_recommendations(
    recommendations: &[Recommendation],
    users: &[User],
    items: &[Item],
) -> Vec<Recommendation> {
    let ids = item_ids(items);
    let user_ids: HashSet<&str> = users.iter().map(|u| u.id.as_str()).collect();
    recommendations
        .iter()
        .filter(|r| !r.registered || user_ids.contains(r.user_id.as_str()))
        .filter(|r| in_catalog(&r.resource_id, &ids))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemType;
    use chrono::{DateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            name: id.to_string(),
            path: format!("/services/{}", id),
            item_type: ItemType::Service,
            category: None,
            scientific_domain: None,
            created_on: None,
            deleted_on: None,
            provider: vec![],
            timestamp: ts("2024-01-01T00:00:00Z"),
        }
    }

    fn known(id: &str) -> ResourceRef {
        ResourceRef::Known(id.to_string())
    }

    fn action(user: &str, registered: bool, src: ResourceRef, tgt: ResourceRef) -> UserAction {
        UserAction {
            user_id: user.to_string(),
            registered,
            source_resource_id: src,
            target_resource_id: tgt,
            source_path: String::new(),
            target_path: String::new(),
            panel: "other".to_string(),
            reward: 0.0,
            timestamp: ts("2024-01-01T00:00:00Z"),
        }
    }

    fn rec(user: &str, registered: bool, resource: ResourceRef) -> Recommendation {
        Recommendation {
            user_id: user.to_string(),
            registered,
            resource_id: resource,
            score: None,
            provider: "p".to_string(),
            timestamp: ts("2024-01-01T00:00:00Z"),
        }
    }

    #[test]
    fn users_are_registered_only_with_known_resources() {
        let actions = vec![
            action("a", true, ResourceRef::Unknown, known("1")),
            action("sess", false, known("2"), known("3")),
            action("a", true, known("1"), known("4")),
            action("b", true, ResourceRef::Unknown, ResourceRef::Unknown),
        ];
        let users = derive_users(&actions);
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, "a");
        assert_eq!(
            users[0].accessed_resources.iter().cloned().collect::<Vec<_>>(),
            vec!["1".to_string(), "4".to_string()]
        );
        assert!(users[1].accessed_resources.is_empty());
    }

    #[test]
    fn actions_keep_unknown_and_catalog_items() {
        let items = vec![item("1"), item("2")];
        let actions = vec![
            action("a", true, ResourceRef::Unknown, known("1")),
            action("a", true, known("9"), known("1")),
            action("a", true, known("2"), ResourceRef::Unknown),
        ];
        let filtered = filter_user_actions(&actions, &items);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].target_resource_id, known("1"));
        assert!(filtered[1].target_resource_id.is_unknown());

        // idempotent
        assert_eq!(filter_user_actions(&filtered, &items), filtered);
    }

    #[test]
    fn recommendations_filter_users_and_items() {
        let items = vec![item("1")];
        let users = vec![User {
            id: "a".to_string(),
            accessed_resources: BTreeSet::new(),
        }];
        let recs = vec![
            rec("a", true, known("1")),
            rec("ghost", true, known("1")),
            rec("sess", false, known("1")),
            rec("a", true, known("2")),
            rec("a", true, ResourceRef::Unknown),
        ];
        let filtered = filter_recommendations(&recs, &users, &items);
        let kept: Vec<(&str, Option<&str>)> = filtered
            .iter()
            .map(|r| (r.user_id.as_str(), r.resource_id.id()))
            .collect();
        assert_eq!(kept, vec![("a", Some("1")), ("sess", Some("1")), ("a", None)]);
    }

    #[test]
    fn window_filter_is_stable() {
        let mut a = action("a", true, known("1"), known("2"));
        a.timestamp = ts("2024-01-05T00:00:00Z");
        let mut b = action("b", true, known("1"), known("2"));
        b.timestamp = ts("2024-02-05T00:00:00Z");
        let mut c = action("c", true, known("1"), known("2"));
        c.timestamp = ts("2024-01-02T00:00:00Z");
        let window = Window {
            start: Some(ts("2024-01-01T00:00:00Z")),
            end: Some(ts("2024-01-31T23:59:59Z")),
        };
        let kept = within_window(vec![a, b, c], &window);
        let ids: Vec<&str> = kept.iter().map(|a| a.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
