//! Unit tests for `QueryClient`'s direct cache reads/writes and cache-wide
//! sweeps (invalidate, reset, clear) over a `QueryCache`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use query_core::{AnyQuery, QueryClient, QueryFilter, QueryKey, QueryOptions, RefetchType, StaleTime};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct TestData {
    id: u32,
    value: String,
    metadata: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct User {
    id: u32,
    name: String,
    email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct Post {
    id: u32,
    title: String,
    content: String,
    user_id: u32,
}

#[test]
fn set_then_get_then_clear_round_trips() {
    let client = QueryClient::new();
    let key = QueryKey::new(["test", "data"]).unwrap();
    let data = TestData {
        id: 1,
        value: "test value".to_string(),
        metadata: Some("metadata".to_string()),
    };

    client.set_query_data::<TestData>(key.clone(), |_| Some(data.clone())).unwrap();
    assert_eq!(client.get_query_data::<TestData>(&key), Some(data));

    client.clear();
    assert_eq!(client.get_query_data::<TestData>(&key), None);
}

#[test]
fn cache_holds_different_data_types_under_different_keys() {
    let client = QueryClient::new();

    let string_key = QueryKey::single("string").unwrap();
    client.set_query_data::<String>(string_key.clone(), |_| Some("Hello, World!".to_string())).unwrap();
    assert_eq!(client.get_query_data::<String>(&string_key), Some("Hello, World!".to_string()));

    let number_key = QueryKey::single("number").unwrap();
    client.set_query_data::<i32>(number_key.clone(), |_| Some(42)).unwrap();
    assert_eq!(client.get_query_data::<i32>(&number_key), Some(42));

    let vector_key = QueryKey::single("vector").unwrap();
    client.set_query_data::<Vec<i32>>(vector_key.clone(), |_| Some(vec![1, 2, 3, 4, 5])).unwrap();
    assert_eq!(client.get_query_data::<Vec<i32>>(&vector_key), Some(vec![1, 2, 3, 4, 5]));
}

#[test]
fn set_query_data_updater_sees_previous_value() {
    let client = QueryClient::new();
    let key = QueryKey::single("counter").unwrap();

    client.set_query_data::<u32>(key.clone(), |_old| Some(1)).unwrap();
    client.set_query_data::<u32>(key.clone(), |old| Some(old.unwrap_or(0) + 1)).unwrap();
    assert_eq!(client.get_query_data::<u32>(&key), Some(2));
}

#[test]
fn set_query_data_updater_returning_none_leaves_cache_untouched() {
    let client = QueryClient::new();
    let key = QueryKey::single("untouched").unwrap();

    client.set_query_data::<u32>(key.clone(), |_| Some(7)).unwrap();
    client.set_query_data::<u32>(key.clone(), |_| None).unwrap();
    assert_eq!(client.get_query_data::<u32>(&key), Some(7));
}

fn seed_users_and_posts(client: &std::sync::Arc<QueryClient>) -> (QueryKey, QueryKey, QueryKey) {
    let user1_key = QueryKey::new(["users", "1"]).unwrap();
    let user2_key = QueryKey::new(["users", "2"]).unwrap();
    let post1_key = QueryKey::new(["posts", "1"]).unwrap();

    client
        .set_query_data::<User>(user1_key.clone(), |_| {
            Some(User { id: 1, name: "John".to_string(), email: "john@example.com".to_string() })
        })
        .unwrap();
    client
        .set_query_data::<User>(user2_key.clone(), |_| {
            Some(User { id: 2, name: "Jane".to_string(), email: "jane@example.com".to_string() })
        })
        .unwrap();
    client
        .set_query_data::<Post>(post1_key.clone(), |_| {
            Some(Post { id: 1, title: "First Post".to_string(), content: "Content".to_string(), user_id: 1 })
        })
        .unwrap();

    (user1_key, user2_key, post1_key)
}

#[test]
fn invalidate_queries_exact_match_marks_only_that_entry() {
    let client = QueryClient::new();
    let (user1_key, user2_key, post1_key) = seed_users_and_posts(&client);

    client.invalidate_queries(&QueryFilter::exact(user1_key.clone()), RefetchType::Active);

    assert!(client.get_query_state::<User>(&user1_key).unwrap().is_invalidated);
    assert!(!client.get_query_state::<User>(&user2_key).unwrap().is_invalidated);
    assert!(!client.get_query_state::<Post>(&post1_key).unwrap().is_invalidated);
}

#[test]
fn invalidate_queries_prefix_match_marks_every_descendant() {
    let client = QueryClient::new();
    let users_key = QueryKey::single("users").unwrap();
    let user1_key = QueryKey::new(["users", "1"]).unwrap();
    let user1_posts_key = QueryKey::new(["users", "1", "posts"]).unwrap();
    let posts_key = QueryKey::single("posts").unwrap();

    client.set_query_data::<Vec<u32>>(users_key.clone(), |_| Some(vec![1, 2])).unwrap();
    client
        .set_query_data::<User>(user1_key.clone(), |_| {
            Some(User { id: 1, name: "John".to_string(), email: "john@example.com".to_string() })
        })
        .unwrap();
    client.set_query_data::<Vec<String>>(user1_posts_key.clone(), |_| Some(vec!["post1".to_string()])).unwrap();
    client.set_query_data::<Vec<String>>(posts_key.clone(), |_| Some(vec!["all".to_string()])).unwrap();

    client.invalidate_queries(&QueryFilter::prefix(QueryKey::single("users").unwrap()), RefetchType::Active);

    assert!(client.get_query_state::<Vec<u32>>(&users_key).unwrap().is_invalidated);
    assert!(client.get_query_state::<User>(&user1_key).unwrap().is_invalidated);
    assert!(client.get_query_state::<Vec<String>>(&user1_posts_key).unwrap().is_invalidated);
    assert!(!client.get_query_state::<Vec<String>>(&posts_key).unwrap().is_invalidated);
}

#[test]
fn get_queries_data_and_set_queries_data_operate_on_a_filtered_group() {
    let client = QueryClient::new();
    let user1_key = QueryKey::new(["users", "1"]).unwrap();
    let user2_key = QueryKey::new(["users", "2"]).unwrap();

    client.set_query_data::<u32>(user1_key.clone(), |_| Some(1)).unwrap();
    client.set_query_data::<u32>(user2_key.clone(), |_| Some(2)).unwrap();

    let filter = QueryFilter::prefix(QueryKey::single("users").unwrap());
    let before = client.get_queries_data::<u32>(&filter);
    assert_eq!(before.len(), 2);

    let updated = client.set_queries_data::<u32>(&filter, |old| old.map(|v| v * 10));
    assert_eq!(updated.len(), 2);
    assert_eq!(client.get_query_data::<u32>(&user1_key), Some(10));
    assert_eq!(client.get_query_data::<u32>(&user2_key), Some(20));
}

#[test]
fn reset_queries_restores_every_matching_query_to_its_pre_fetch_state() {
    let client = QueryClient::new();
    let key = QueryKey::single("reset-me").unwrap();
    client.set_query_data::<u32>(key.clone(), |_| Some(9)).unwrap();
    assert_eq!(client.get_query_data::<u32>(&key), Some(9));

    client.reset_queries::<u32>(&QueryFilter::exact(key.clone()));

    let state = client.get_query_state::<u32>(&key).unwrap();
    assert_eq!(state.data, None);
}

#[test]
fn clear_removes_every_cached_query_regardless_of_key() {
    let client = QueryClient::new();
    let key1 = QueryKey::new(["test", "1"]).unwrap();
    let key2 = QueryKey::new(["test", "2"]).unwrap();
    let key3 = QueryKey::new(["other", "data"]).unwrap();

    client.set_query_data::<&'static str>(key1.clone(), |_| Some("data1")).unwrap();
    client.set_query_data::<&'static str>(key2.clone(), |_| Some("data2")).unwrap();
    client.set_query_data::<&'static str>(key3.clone(), |_| Some("data3")).unwrap();

    client.clear();

    assert_eq!(client.get_query_data::<&'static str>(&key1), None);
    assert_eq!(client.get_query_data::<&'static str>(&key2), None);
    assert_eq!(client.get_query_data::<&'static str>(&key3), None);
}

#[test]
fn reusing_a_key_with_a_different_data_type_is_a_cache_error() {
    let client = QueryClient::new();
    let key = QueryKey::single("mismatched").unwrap();
    client.set_query_data::<u32>(key.clone(), |_| Some(1)).unwrap();

    let result = client.set_query_data::<String>(key, |_| Some("nope".to_string()));
    assert!(result.is_err());
}

#[test]
fn invalidate_queries_with_refetch_type_none_leaves_queries_stale_but_is_queryable() {
    let client = QueryClient::new();
    let (user1_key, user2_key, _post1_key) = seed_users_and_posts(&client);

    client.invalidate_queries(&QueryFilter::prefix(QueryKey::single("users").unwrap()), RefetchType::None);

    assert!(client.get_query_state::<User>(&user1_key).unwrap().is_invalidated);
    assert!(client.get_query_state::<User>(&user2_key).unwrap().is_invalidated);
}

#[test]
fn query_filter_predicate_restricts_the_match_set() {
    let client = QueryClient::new();
    let (user1_key, user2_key, _post1_key) = seed_users_and_posts(&client);

    let filter = QueryFilter::prefix(QueryKey::single("users").unwrap())
        .predicate(move |query| query.query_key() == &user1_key);

    let matched = client.get_queries_data::<User>(&filter);
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].0, QueryKey::new(["users", "1"]).unwrap());
    assert_ne!(matched[0].0, user2_key);
}

#[test]
fn query_filter_stale_only_matches_invalidated_entries() {
    let client = QueryClient::new();
    // A long stale_time so freshness isn't immediately swallowed by the
    // default `stale_time: 0`, which would otherwise call every entry stale
    // regardless of invalidation.
    client.set_query_defaults::<User>(
        QueryKey::single("users").unwrap(),
        QueryOptions { stale_time: StaleTime::Millis(Duration::from_secs(60)), ..Default::default() },
    );
    let (user1_key, user2_key, _post1_key) = seed_users_and_posts(&client);

    client.invalidate_queries(&QueryFilter::exact(user1_key.clone()), RefetchType::None);

    let stale = QueryFilter::prefix(QueryKey::single("users").unwrap()).stale(true);
    let matched = client.get_queries_data::<User>(&stale);
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].0, user1_key);

    let fresh = QueryFilter::prefix(QueryKey::single("users").unwrap()).stale(false);
    let matched_fresh = client.get_queries_data::<User>(&fresh);
    assert_eq!(matched_fresh.len(), 1);
    assert_eq!(matched_fresh[0].0, user2_key);
}

#[test]
fn query_filter_active_type_excludes_unobserved_queries() {
    let client = QueryClient::new();
    let key = QueryKey::single("unobserved").unwrap();
    client.set_query_data::<u32>(key.clone(), |_| Some(1)).unwrap();

    let active_only = QueryFilter::all().active();
    assert!(client.get_queries_data::<u32>(&active_only).is_empty());

    let inactive_only = QueryFilter::all().inactive();
    assert_eq!(client.get_queries_data::<u32>(&inactive_only).len(), 1);
}
