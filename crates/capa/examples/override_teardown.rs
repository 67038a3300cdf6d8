//! Override and Teardown Demo
//!
//! Demonstrates runtime behavior replacement:
//! - Simulating an outage with an override, then restoring
//! - Compare-and-clear removal: stale handles are harmless
//! - OverrideGroup teardown for whole scenarios
//! - Wrapping a function with its own direct-call adapter
//!
//! Run with: cargo run --example override_teardown -p capa

use capa::{
    api_fn, call_api_function, create_get_api, override_api, ApiError, ApiLayer, ApiOptions,
    CallOptions, LayerOptions, OverrideGroup,
};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 Override and Teardown Demo                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let layer = ApiLayer::create(LayerOptions::default().install_global(false))?;

    demo_outage(&layer).await?;
    demo_compare_and_clear(&layer).await?;
    demo_group_teardown(&layer).await?;
    demo_decorating(&layer).await?;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Demo complete!");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

/// Fake an outage for one function, observe it, then restore
async fn demo_outage(layer: &ApiLayer) -> Result<(), ApiError> {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  1. Simulating an Outage");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let get_balance = create_get_api(
        api_fn(|account: u32| async move { Ok::<_, ApiError>(i64::from(account) * 100) }),
        ApiOptions::default().with_name("getBalance").with_layer(layer),
    )?;

    println!("  Before: getBalance(3) = {:?}", get_balance.call(3).await);

    let outage = override_api(&get_balance, api_fn(|_: u32| async {
        Err::<i64, _>(ApiError::upstream("ledger unavailable"))
    }))?;
    println!("  During: getBalance(3) = {:?}", get_balance.call(3).await);

    println!("  Removed the override: {}", outage.remove());
    println!("  After:  getBalance(3) = {:?}", get_balance.call(3).await);
    println!();
    Ok(())
}

/// A handle only removes the exact override it installed
async fn demo_compare_and_clear(layer: &ApiLayer) -> Result<(), ApiError> {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  2. Compare-and-Clear Removal");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let get_motd = create_get_api(
        api_fn(|(): ()| async { Ok::<_, ApiError>("welcome".to_string()) }),
        ApiOptions::default().with_name("getMotd").with_layer(layer),
    )?;

    let first = override_api(&get_motd, api_fn(|(): ()| async {
        Ok::<_, ApiError>("first override".to_string())
    }))?;
    let second = override_api(&get_motd, api_fn(|(): ()| async {
        Ok::<_, ApiError>("second override".to_string())
    }))?;

    println!("  Two overrides installed; the second replaced the first");
    println!("    ├─ first.remove()  -> {} (stale, no effect)", first.remove());
    println!("    ├─ getMotd() = {:?}", get_motd.call(()).await?);
    println!("    ├─ second.remove() -> {}", second.remove());
    println!("    └─ getMotd() = {:?}", get_motd.call(()).await?);
    println!();
    Ok(())
}

/// Scenario overrides collected into a group come down together
async fn demo_group_teardown(layer: &ApiLayer) -> Result<(), ApiError> {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  3. Group Teardown");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let get_user = create_get_api(
        api_fn(|(): ()| async { Ok::<_, ApiError>("real user".to_string()) }),
        ApiOptions::default().with_name("getUser").with_layer(layer),
    )?;
    let get_plan = create_get_api(
        api_fn(|(): ()| async { Ok::<_, ApiError>("free".to_string()) }),
        ApiOptions::default().with_name("getPlan").with_layer(layer),
    )?;

    let mut premium_scenario = OverrideGroup::new();
    premium_scenario
        .add(&get_user, api_fn(|(): ()| async {
            Ok::<_, ApiError>("premium user".to_string())
        }))?
        .add(&get_plan, api_fn(|(): ()| async {
            Ok::<_, ApiError>("premium".to_string())
        }))?;

    println!("  Scenario active ({} overrides):", premium_scenario.len());
    println!("    ├─ getUser() = {:?}", get_user.call(()).await?);
    println!("    └─ getPlan() = {:?}", get_plan.call(()).await?);

    premium_scenario.remove_all();
    println!("  After remove_all (group empty: {}):", premium_scenario.is_empty());
    println!("    ├─ getUser() = {:?}", get_user.call(()).await?);
    println!("    └─ getPlan() = {:?}", get_plan.call(()).await?);
    println!();
    Ok(())
}

/// Decorate a function by calling through its own adapter
async fn demo_decorating(layer: &ApiLayer) -> Result<(), ApiError> {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  4. Wrapping via a Direct-Call Adapter");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let get_quote = create_get_api(
        api_fn(|symbol: String| async move { Ok::<_, ApiError>(format!("{symbol}: 101.5")) }),
        ApiOptions::default().with_name("getQuote").with_layer(layer),
    )?;

    // no_override keeps the wrapped call from re-entering the override
    let passthrough = call_api_function(&get_quote, CallOptions::new().with_no_override())?;
    get_quote.install_override(api_fn(move |symbol: String| {
        let passthrough = passthrough.clone();
        async move {
            let quote = passthrough.call(symbol).await?;
            Ok::<_, ApiError>(format!("{quote} (delayed feed)"))
        }
    }))?;

    println!("  getQuote(\"CAPA\") = {:?}", get_quote.call("CAPA".to_string()).await?);
    println!();
    Ok(())
}
