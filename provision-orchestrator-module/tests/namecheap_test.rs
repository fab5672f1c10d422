//! Namecheap module 集成测试（sandbox）
//!
//! 运行方式:
//! ```bash
//! NAMECHEAP_API_USER=xxx NAMECHEAP_API_KEY=xxx NAMECHEAP_CLIENT_IP=203.0.113.7 TEST_DOMAIN=example.com \
//!     cargo test -p provision-orchestrator-module --test namecheap_test -- --ignored --nocapture --test-threads=1
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use common::TestContext;

#[tokio::test]
#[ignore = "integration test: requires NAMECHEAP_API_USER, NAMECHEAP_API_KEY, NAMECHEAP_CLIENT_IP and TEST_DOMAIN"]
async fn test_namecheap_test_connection() {
    skip_if_no_credentials!(
        "NAMECHEAP_API_USER",
        "NAMECHEAP_API_KEY",
        "NAMECHEAP_CLIENT_IP",
        "TEST_DOMAIN"
    );

    let ctx = require_some!(TestContext::namecheap(), "创建测试上下文失败");
    require_ok!(
        ctx.module.test_connection(&ctx.call).await,
        "test_connection 调用失败"
    );

    println!("✓ test_connection 测试通过");
}

#[tokio::test]
#[ignore = "integration test: requires NAMECHEAP_API_USER, NAMECHEAP_API_KEY, NAMECHEAP_CLIENT_IP and TEST_DOMAIN"]
async fn test_namecheap_sync_and_reads() {
    skip_if_no_credentials!(
        "NAMECHEAP_API_USER",
        "NAMECHEAP_API_KEY",
        "NAMECHEAP_CLIENT_IP",
        "TEST_DOMAIN"
    );

    let ctx = require_some!(TestContext::namecheap(), "创建测试上下文失败");
    let status = require_ok!(ctx.module.sync(&ctx.call, &ctx.domain).await, "sync 调用失败");
    assert!(!status.transferred_away, "测试域名应属于当前账户");
    assert!(status.expiry_date.is_some(), "应返回到期日");

    let nameservers = require_ok!(ctx.module.get_nameservers(&ctx.call, &ctx.domain).await);
    println!("nameservers: {nameservers:?}");

    let locked = require_ok!(ctx.module.get_registrar_lock(&ctx.call, &ctx.domain).await);
    println!("✓ sync 测试通过: {status:?}, locked={locked}");
}

#[tokio::test]
#[ignore = "integration test: requires NAMECHEAP_API_USER, NAMECHEAP_API_KEY, NAMECHEAP_CLIENT_IP and TEST_DOMAIN"]
async fn test_namecheap_secret_never_in_transcript() {
    skip_if_no_credentials!(
        "NAMECHEAP_API_USER",
        "NAMECHEAP_API_KEY",
        "NAMECHEAP_CLIENT_IP",
        "TEST_DOMAIN"
    );

    let ctx = require_some!(TestContext::namecheap(), "创建测试上下文失败");
    let _ = ctx.module.test_connection(&ctx.call).await;
    let api_key = std::env::var("NAMECHEAP_API_KEY").unwrap();
    for exchange in ctx.call.take_transcript() {
        assert!(!ctx.call.redact(&exchange.endpoint).contains(&api_key));
        assert!(!ctx.call.redact(&exchange.body).contains(&api_key));
    }
}
