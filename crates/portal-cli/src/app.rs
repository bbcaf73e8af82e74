//! Command handlers, generic over the realm's capability model.

use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use portal_config::{Config, Paths};
use portal_storage::{create_file_store, KeyValueStore};
use reqwest::Method;
use session_coordinator::{
    ApiRequest, AuthError, AuthState, CapabilityModel, Credentials, ExpiryPolicy, HttpAuthBackend,
    HttpTransport, RealmConfig, SessionCoordinator, TracingNavigator,
};
use tracing::debug;

use crate::Commands;

type CliResult<T> = Result<T, Box<dyn Error>>;

fn build_coordinator<C: CapabilityModel>(
    realm: RealmConfig,
    config: &Config,
    paths: &Paths,
) -> CliResult<SessionCoordinator<C>> {
    let realm = realm
        .with_management_keyword(config.management_keyword.clone())
        .with_expiry(ExpiryPolicy::from_secs(
            config.refresh_immediately_within_secs,
            config.refresh_margin_secs,
        ));

    let base_url = config.api_base_url()?;
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let store_path = paths.session_store_file(&realm.name);
    debug!(realm = %realm.name, store = %store_path.display(), api = %base_url, "Building session coordinator");

    let storage: Arc<dyn KeyValueStore> = Arc::from(create_file_store(&store_path)?);
    let backend = Arc::new(HttpAuthBackend::<C>::new(base_url.clone(), timeout)?);
    let transport = Arc::new(HttpTransport::new(base_url, timeout)?);

    Ok(SessionCoordinator::new(
        realm,
        backend,
        transport,
        storage,
        Arc::new(TracingNavigator),
    ))
}

pub(crate) async fn run<C: CapabilityModel>(
    realm: RealmConfig,
    command: Commands,
    location: Option<&str>,
    config: &Config,
    paths: &Paths,
) -> CliResult<()> {
    let coordinator = build_coordinator::<C>(realm, config, paths)?;
    if let Some(location) = location {
        coordinator.set_location(location);
    }

    let result = match command {
        Commands::Login {
            username,
            password,
            code,
            new_secret,
            confirm_secret,
        } => {
            let password = password.ok_or("a password is required (--password or PORTAL_PASSWORD)")?;
            login(
                &coordinator,
                Credentials::new(username, password),
                code,
                new_secret.zip(confirm_secret),
            )
            .await
        }
        Commands::Status => status(&coordinator),
        Commands::Logout => {
            coordinator.logout().await?;
            println!("Signed out");
            Ok(())
        }
        Commands::Tenant { path } => {
            coordinator.set_location(path);
            let tenant = coordinator.tenant();
            println!("tenant: {}", tenant.slug().unwrap_or("global"));
            println!("login:  {}", coordinator.login_path());
            Ok(())
        }
        Commands::Request { method, path, body } => request(&coordinator, &method, path, body).await,
    };

    coordinator.shutdown();
    result
}

async fn login<C: CapabilityModel>(
    coordinator: &SessionCoordinator<C>,
    credentials: Credentials,
    code: Option<String>,
    new_secret: Option<(String, String)>,
) -> CliResult<()> {
    if coordinator.restore()? {
        println!("Already signed in; run `logout` first");
        return Ok(());
    }

    let mut state = coordinator.login(&credentials).await?;

    if state == AuthState::TwoFactorPending {
        match code {
            Some(code) => state = coordinator.verify_two_factor(&code).await?,
            None => {
                println!("Two-factor code required; run `login` again with --code");
                return Ok(());
            }
        }
    }

    if state == AuthState::ForcedSecretResetPending {
        match new_secret {
            Some((secret, confirm)) => {
                state = coordinator.force_change_secret(&secret, &confirm).await?
            }
            None => {
                println!(
                    "Password change required; run `login` again with --new-secret and --confirm-secret"
                );
                return Ok(());
            }
        }
    }

    match coordinator.principal() {
        Some(principal) if state.is_authenticated() => {
            println!("Signed in as {} ({})", principal.display_name, principal.username);
        }
        _ => println!("State: {:?}", state),
    }
    Ok(())
}

fn status<C: CapabilityModel>(coordinator: &SessionCoordinator<C>) -> CliResult<()> {
    if !coordinator.restore()? {
        println!("Not signed in");
        return Ok(());
    }

    let Some(session) = coordinator.session() else {
        println!("Not signed in");
        return Ok(());
    };
    let principal = session.principal();

    println!("realm:        {}", coordinator.realm().name);
    println!("user:         {} ({})", principal.display_name, principal.username);
    println!(
        "organization: {}",
        principal.tenant_id.as_deref().unwrap_or("global")
    );
    println!(
        "tenant:       {}",
        coordinator.tenant().slug().unwrap_or("global")
    );
    println!("expires:      {}", session.expires_at());
    println!(
        "capabilities: {}",
        serde_json::to_string(&principal.capabilities)?
    );
    Ok(())
}

async fn request<C: CapabilityModel>(
    coordinator: &SessionCoordinator<C>,
    method: &str,
    path: String,
    body: Option<String>,
) -> CliResult<()> {
    let method = Method::from_str(&method.to_uppercase())?;
    let mut request = ApiRequest::new(method, path);
    if let Some(body) = body {
        request = request.with_body(serde_json::from_str(&body)?);
    }

    coordinator.restore()?;
    match coordinator.request(request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(AuthError::SessionExpired) => {
            println!("{}", AuthError::SessionExpired);
            println!("Sign in again at {}", coordinator.login_path());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
