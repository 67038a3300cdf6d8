//! Mock Mode Demo
//!
//! Demonstrates fixture-backed dispatch in mock mode:
//! - A layer in mock mode with a filesystem resolver
//! - Fixture references resolved to JSON files on disk
//! - Producers computing fixtures from call arguments
//! - The delay floor, layer-wide and per function
//!
//! Run with: cargo run --example mock_mode_demo -p capa

use capa::{
    api_fn, create_get_api, create_get_api_with_mock, ApiError, ApiLayer, ApiOptions,
    FsMockResolver, LayerOptions, MockRef,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: String,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                       Mock Mode Demo                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let fixtures = tempfile::tempdir()?;
    std::fs::write(
        fixtures.path().join("user.json"),
        r#"{ "id": "7", "name": "Ada Lovelace" }"#,
    )?;

    let resolver = FsMockResolver::new(fixtures.path()).with_producer("greet", |args| async move {
        let name = args.as_str().unwrap_or("stranger").to_string();
        Ok(serde_json::json!(format!("hola, {name}!")))
    });
    println!("  Resolver: {resolver:?}\n");

    let layer = ApiLayer::create(
        LayerOptions::default()
            .with_mock_mode(true)
            .with_mock_delay_ms(150)
            .with_resolver(resolver)
            .install_global(false),
    )?;

    demo_fixture_files(&layer).await?;
    demo_producers(&layer).await?;
    demo_delay_floor(&layer).await?;
    demo_coverage(&layer);

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Demo complete!");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

/// Resolve a fixture file instead of hitting the real backend
async fn demo_fixture_files(layer: &ApiLayer) -> Result<(), ApiError> {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  1. Fixture Files");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let get_user = create_get_api_with_mock(
        api_fn(|id: String| async move {
            // Would be a network call in production
            Ok::<_, ApiError>(User { id, name: "from the real backend".to_string() })
        }),
        "user.json",
        ApiOptions::default().with_name("getUser").with_layer(layer),
    )?;

    let user = get_user.call("7".to_string()).await?;
    println!("  getUser(\"7\") in mock mode:");
    println!("    ├─ id:   {}", user.id);
    println!("    └─ name: {} (served from user.json)", user.name);
    println!();
    Ok(())
}

/// Producers compute the fixture from the encoded arguments
async fn demo_producers(layer: &ApiLayer) -> Result<(), ApiError> {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  2. Producer References");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let get_greeting = create_get_api_with_mock(
        api_fn(|name: String| async move { Ok::<_, ApiError>(format!("hello, {name}")) }),
        MockRef::producer("greet"),
        ApiOptions::default().with_name("getGreeting").with_layer(layer),
    )?;

    for name in ["Ada", "Alan"] {
        let greeting = get_greeting.call(name.to_string()).await?;
        println!("  getGreeting({name:?}) -> {greeting:?}");
    }
    println!();
    Ok(())
}

/// The floor holds results back; slower calls pass through untouched
async fn demo_delay_floor(layer: &ApiLayer) -> Result<(), ApiError> {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  3. Delay Floor");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let get_user = create_get_api_with_mock(
        api_fn(|id: String| async move {
            Ok::<_, ApiError>(User { id, name: "real".to_string() })
        }),
        "user.json",
        ApiOptions::default().with_name("getUserSlow").with_layer(layer),
    )?;

    let start = Instant::now();
    get_user.call("7".to_string()).await?;
    println!("  Layer floor 150ms: resolved after {:?}", start.elapsed());

    get_user.set_mock_delay_ms(40);
    let start = Instant::now();
    get_user.call("7".to_string()).await?;
    println!("  Function floor 40ms: resolved after {:?}", start.elapsed());
    println!();
    Ok(())
}

/// Coverage lists every installed function with no mock configured
fn demo_coverage(layer: &ApiLayer) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  4. Mock Coverage");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let bare = create_get_api(
        api_fn(|(): ()| async { Ok::<_, ApiError>(0u32) }),
        ApiOptions::default().with_name("getUncovered").with_layer(layer),
    )
    .expect("layer is alive");

    let uncovered = layer.mock_coverage();
    println!("  Installed functions: {}", layer.api_count());
    println!("  Without a mock or reference:");
    for id in &uncovered {
        println!("    ├─ {id}");
    }
    println!("    └─ ({} total, including {})", uncovered.len(), bare.api_name());
    println!();
}
