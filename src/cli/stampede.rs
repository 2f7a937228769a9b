use std::path::Path;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use zeroize::Zeroizing;

use crate::cli::json_output::StampedeResponse;
use callerid::api::SecurityDomain;
use callerid::config::Config;
use callerid::error::{CallerIdError, Result};
use callerid::identity::{Credential, Principal};
use callerid::manager::{Authenticator, LockingStrategy, StaticAuthenticator};

fn parse_locking(value: &str) -> Result<LockingStrategy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "simple" => Ok(LockingStrategy::Simple),
        "serialized" => Ok(LockingStrategy::Serialized),
        other => Err(CallerIdError::InvalidUsage(format!(
            "unknown locking strategy '{}' (expected simple or serialized)",
            other
        ))),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    config_path: &Path,
    users: &Path,
    principal: &str,
    password: Option<String>,
    threads: usize,
    locking: Option<&str>,
    delay_ms: u64,
    json: bool,
) -> Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(locking) = locking {
        config.manager.locking = parse_locking(locking)?;
    }
    let threads = threads.max(1);

    let authenticator = Arc::new(
        StaticAuthenticator::load(users)?.with_delay(Duration::from_millis(delay_ms)),
    );
    let domain = Arc::new(SecurityDomain::from_config(
        &config,
        Arc::clone(&authenticator) as Arc<dyn Authenticator>,
    )?);

    let principal = Principal::new(principal);
    let password = password.map(Zeroizing::new);
    let credential = password.as_ref().map(|p| Credential::password(p.as_str()));
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let domain = Arc::clone(&domain);
            let barrier = Arc::clone(&barrier);
            let principal = principal.clone();
            let credential = credential.clone();
            std::thread::spawn(move || {
                barrier.wait();
                domain.is_valid(Some(&principal), credential.as_ref())
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.join() {
            Ok(true) => successes += 1,
            Ok(false) => {}
            Err(_) => return Err(CallerIdError::Other("login thread panicked".into())),
        }
    }

    let response = StampedeResponse {
        principal: principal.to_string(),
        locking: config.manager.locking.to_string(),
        threads,
        successes,
        authenticator_calls: authenticator.calls(),
    };

    if json {
        let out = serde_json::to_string_pretty(&response)
            .map_err(|e| CallerIdError::Other(format!("JSON serialize error: {}", e)))?;
        println!("{}", out);
    } else {
        println!(
            "{} concurrent logins for {} ({} locking): {} succeeded, {} authenticator calls",
            response.threads,
            response.principal,
            response.locking,
            response.successes,
            response.authenticator_calls
        );
    }
    if successes == 0 {
        return Err(CallerIdError::AuthenticationFailed(format!(
            "no login for '{}' succeeded",
            principal
        )));
    }
    Ok(())
}
