use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::AsyncReadExt;

/// Read the handler input from `path`, or stdin when absent.
pub async fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("reading {}", p.display())),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}

pub fn emit_stdout<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
