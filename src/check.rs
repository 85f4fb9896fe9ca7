use anyhow::{bail, Result};

use crate::config::Config;
use crate::readwise::ReadwiseClient;
use crate::zotero::ZoteroClient;

/// Which credentials are present, as `(setting, configured)` rows.
pub fn credential_rows(config: &Config) -> Vec<(&'static str, bool)> {
    vec![
        ("zotero.library_id", config.zotero.library_id.is_some()),
        ("zotero.api_key", config.zotero.api_key.is_some()),
        ("readwise.token", config.readwise.token.is_some()),
    ]
}

pub fn run_check(config: &Config) -> Result<()> {
    println!("{:<20} {:<12}", "SETTING", "STATUS");
    for (name, configured) in credential_rows(config) {
        let status = if configured { "SET" } else { "MISSING" };
        println!("{:<20} {:<12}", name, status);
    }
    println!(
        "{:<20} {:<12}",
        "zotero.library_type", config.zotero.library_type
    );
    println!();

    let zotero_status = match config.zotero_credentials() {
        Ok((library_id, api_key)) => ZoteroClient::new(
            &config.zotero.base_url,
            config.zotero.library_type,
            library_id,
            api_key,
            config.http.timeout(),
        )
        .and_then(|client| client.verify_key())
        .map(|info| match info.username {
            Some(name) => format!("OK (key belongs to {})", name),
            None => "OK".to_string(),
        })
        .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let readwise_status = match config.readwise_token() {
        Ok(token) => ReadwiseClient::new(&config.readwise.base_url, token, config.http.timeout())
            .and_then(|client| client.verify_token())
            .map(|_| "OK".to_string())
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    println!("{:<12} {:<8} DETAIL", "SERVICE", "HEALTHY");
    let mut healthy = true;
    for (service, status) in [("zotero", zotero_status), ("readwise", readwise_status)] {
        match status {
            Ok(detail) => println!("{:<12} {:<8} {}", service, true, detail),
            Err(detail) => {
                healthy = false;
                println!("{:<12} {:<8} {}", service, false, detail);
            }
        }
    }

    if !healthy {
        bail!("Credential check failed");
    }
    Ok(())
}
