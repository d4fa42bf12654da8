//! Prints the OpenAPI document as JSON, for docs pipelines and CI diffs.

use anyhow::Result;

fn main() -> Result<()> {
    let doc = verki::api::openapi();
    let json = serde_json::to_string_pretty(&doc)?;
    println!("{json}");
    Ok(())
}
