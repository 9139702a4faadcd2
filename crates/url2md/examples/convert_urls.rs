//! Example: Convert a few live pages in preview mode and check the results
//!
//! Run with: cargo run -p url2md --example convert_urls

use std::sync::Arc;
use url2md::{
    BatchCoordinator, BatchOptions, BatchSummary, Config, ConversionResult, ConvertOverrides,
    Converter,
};

/// Test case definition
struct TestCase {
    url: &'static str,
    description: &'static str,
    expect_contains: Option<&'static str>,
}

const TEST_CASES: &[TestCase] = &[
    TestCase {
        url: "https://example.com",
        description: "Simple HTML page",
        expect_contains: Some("Example Domain"),
    },
    TestCase {
        url: "https://httpbin.org/html",
        description: "Long-form text",
        expect_contains: Some("Herman Melville"),
    },
    TestCase {
        url: "https://www.rust-lang.org/learn",
        description: "Navigation-heavy page",
        expect_contains: Some("Rust"),
    },
];

#[tokio::main]
async fn main() {
    println!("url2md Examples");
    println!("===============\n");

    let converter = match Converter::new(Config::default()) {
        Ok(converter) => Arc::new(converter),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let urls: Vec<&str> = TEST_CASES.iter().map(|case| case.url).collect();
    let options = BatchOptions::new(2)
        .continue_on_error(true)
        .overrides(ConvertOverrides::preview());
    let outcomes = match BatchCoordinator::new(converter)
        .convert_batch(urls.as_slice(), &options)
        .await
    {
        Ok(outcomes) => outcomes,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut passed = 0;
    let mut failed = 0;

    for (i, (case, outcome)) in TEST_CASES.iter().zip(&outcomes).enumerate() {
        println!("{}. {}", i + 1, case.description);
        println!("   URL: {}", case.url);

        match outcome {
            Ok(result) if result.success => {
                print_result_summary(result);
                if check_expectations(case, result) {
                    println!("   ✓ PASS\n");
                    passed += 1;
                } else {
                    println!("   ✗ FAIL (expectations not met)\n");
                    failed += 1;
                }
            }
            Ok(result) => {
                println!("   Error: {}", result.error.as_deref().unwrap_or("unknown"));
                println!("   ✗ FAIL\n");
                failed += 1;
            }
            Err(e) => {
                println!("   Error: {}", e);
                println!("   ✗ FAIL\n");
                failed += 1;
            }
        }
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    println!("===============");
    println!(
        "Results: {} passed, {} failed ({} converted)",
        passed, failed, summary.succeeded
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn print_result_summary(result: &ConversionResult) {
    println!("   Title: {}", result.title);
    if let Some(method) = result.extraction_method {
        println!("   Method: {}", method);
    }
    println!("   Size: {} characters", result.size);

    let preview = result.markdown.chars().take(100).collect::<String>();
    let preview = preview.replace('\n', " ");
    println!(
        "   Preview: {}{}",
        preview,
        if result.size > 100 { "..." } else { "" }
    );
}

fn check_expectations(case: &TestCase, result: &ConversionResult) -> bool {
    if let Some(expected_text) = case.expect_contains {
        if !result.markdown.contains(expected_text) {
            println!("   Expected content to contain '{}'", expected_text);
            return false;
        }
    }
    true
}
