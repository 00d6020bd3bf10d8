//! `vigil check`: validate an accounts file offline.

use std::path::Path;

use miette::Result;

use vigil_fleet::{Account, dedupe_accounts, load_records};

pub async fn run(path: &Path) -> Result<()> {
    let records = load_records(path)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let loaded = records.len();
    let accounts = dedupe_accounts(records);

    if accounts.is_empty() {
        return Err(miette::miette!("{} contains no accounts", path.display()));
    }

    println!("{}", summary(path, loaded, &accounts));
    Ok(())
}

fn summary(path: &Path, loaded: usize, accounts: &[Account]) -> String {
    let mut out = format!(
        "{}: {} accounts ({} duplicates dropped)",
        path.display(),
        accounts.len(),
        loaded - accounts.len()
    );
    for account in accounts {
        let proxy = account
            .proxy
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "direct".to_string());
        out.push_str(&format!("\n  {}  via {}", account.email(), proxy));
    }
    out
}
