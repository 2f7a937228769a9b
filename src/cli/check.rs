use std::path::Path;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::cli::json_output::CheckResponse;
use callerid::api::SecurityDomain;
use callerid::config::Config;
use callerid::error::{CallerIdError, Result};
use callerid::identity::{Credential, Principal};
use callerid::manager::{Authenticator, StaticAuthenticator};

pub fn run(
    config_path: &Path,
    users: &Path,
    principal: Option<&str>,
    password: Option<String>,
    repeat: usize,
    json: bool,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let authenticator = Arc::new(StaticAuthenticator::load(users)?);
    let domain = SecurityDomain::from_config(
        &config,
        Arc::clone(&authenticator) as Arc<dyn Authenticator>,
    )?;

    let principal = principal.map(Principal::new);
    let password = password.map(Zeroizing::new);
    let credential = password.as_ref().map(|p| Credential::password(p.as_str()));

    let attempts = repeat.max(1);
    let mut roles = Vec::new();
    let mut caller_principal = None;
    for _ in 0..attempts {
        let _frame = domain.login(principal.as_ref(), credential.as_ref())?;
        let caller = domain.caller();
        roles = caller
            .current_subject()
            .and_then(|s| {
                s.roles()
                    .map(|g| g.members().iter().map(|m| m.name().to_string()).collect::<Vec<_>>())
            })
            .unwrap_or_default();
        caller_principal = caller.effective_caller_principal().map(|p| p.to_string());
    }

    let calls = authenticator.calls();
    let response = CheckResponse {
        principal: principal.as_ref().map(|p| p.to_string()),
        valid: true,
        attempts,
        authenticator_calls: calls,
        cache_hits: attempts.saturating_sub(calls),
        roles,
        caller_principal,
        cached_principals: domain
            .manager()
            .cached_principals()
            .iter()
            .map(|k| k.to_string())
            .collect(),
    };

    if json {
        let out = serde_json::to_string_pretty(&response)
            .map_err(|e| CallerIdError::Other(format!("JSON serialize error: {}", e)))?;
        println!("{}", out);
    } else {
        println!(
            "{} authenticated ({} logins, {} authenticator calls, {} cache hits)",
            response.principal.as_deref().unwrap_or("<anonymous>"),
            response.attempts,
            response.authenticator_calls,
            response.cache_hits
        );
        if let Some(caller) = &response.caller_principal {
            println!("caller principal: {}", caller);
        }
        if !response.roles.is_empty() {
            println!("roles: {}", response.roles.join(", "));
        }
    }
    Ok(())
}
