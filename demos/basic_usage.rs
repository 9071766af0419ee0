//! Minimal end-to-end walkthrough of `QueryClient`: fetch a query, read it
//! straight back out of the cache, then run a mutation whose success
//! callback invalidates the query it affected.
//!
//! Run with `cargo run --example basic_usage`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use query_core::{MutationOptions, QueryClient, QueryError, QueryFilter, QueryKey, QueryOptions, RefetchType, RetryPolicy};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct User {
    id: u32,
    name: String,
    email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct CreateUserRequest {
    name: String,
    email: String,
}

async fn fetch_user(id: u32) -> Result<User, QueryError> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if id == 0 {
        return Err(QueryError::http(404, "user not found"));
    }
    Ok(User { id, name: format!("User {id}"), email: format!("user{id}@example.com") })
}

async fn create_user(request: CreateUserRequest) -> Result<User, QueryError> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(User { id: 2, name: request.name, email: request.email })
}

#[tokio::main]
async fn main() -> Result<(), QueryError> {
    let client = QueryClient::new();

    let user_key = QueryKey::new(["users", "1"])?;
    let user = client
        .fetch_query(
            user_key.clone(),
            Arc::new(|_abort| Box::pin(async { fetch_user(1).await })),
            Some(QueryOptions { stale_time: query_core::StaleTime::Millis(Duration::from_secs(60)), ..Default::default() }),
        )
        .await?;
    println!("fetched: {user:?}");

    // A second read against the same key is served from the cache without
    // running `fetch_user` again.
    let cached = client.get_query_data::<User>(&user_key);
    println!("cache read: {cached:?}");

    // Run a mutation whose success callback invalidates the user-1 query,
    // simulating "creating a user invalidates the user list".
    let client_for_callback = client.clone();
    let user_key_for_callback = user_key.clone();
    let options = MutationOptions::<User, CreateUserRequest, ()> {
        retry: RetryPolicy::Never,
        on_success: Some(Arc::new(move |_created: &User, _vars, _ctx| {
            client_for_callback.invalidate_queries(&QueryFilter::exact(user_key_for_callback.clone()), RefetchType::Active);
            Ok(())
        })),
        ..Default::default()
    };
    let (_mutation, result) = client
        .mutation_cache()
        .dispatch(
            options,
            CreateUserRequest { name: "Jane Doe".to_string(), email: "jane@example.com".to_string() },
            Arc::new(|request, _abort| Box::pin(async move { create_user(request).await })),
        )
        .await;
    let created = result?;
    println!("created: {created:?}");

    let is_invalidated = client.get_query_state::<User>(&user_key).map(|state| state.is_invalidated);
    println!("user-1 invalidated after mutation: {is_invalidated:?}");

    Ok(())
}
