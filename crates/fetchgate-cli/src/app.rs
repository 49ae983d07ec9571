use anyhow::Result;
use tracing::{debug, info};

use fetchgate_core::api::ApiClient;
use fetchgate_core::{Config, CredentialStore, Gate, SessionGuard, Verdict};

use crate::router::Route;
use crate::views;

/// Token used by `login` when none is given
const DEFAULT_LOGIN_TOKEN: &str = "fake-token";

/// Environment variable that can supply the login token
const TOKEN_ENV_VAR: &str = "FETCHGATE_TOKEN";

/// Application state container
pub struct App {
    store: CredentialStore,
    guard: SessionGuard,
    api: ApiClient,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store = config.credential_store()?;
        let guard = SessionGuard::new(config.login_path.clone());
        let api = ApiClient::new(&config)?;
        Ok(Self { store, guard, api })
    }

    pub async fn navigate(&mut self, route: Route) -> Result<()> {
        match route {
            Route::Home => views::home(),
            Route::Login(token) => self.login(token)?,
            Route::Logout => self.logout()?,
            Route::Status => self.status(),
            Route::Users => views::users(self.api.users()).await,
            Route::Posts => views::posts(self.api.posts()).await,
            Route::Post(id) => views::post(self.api.post(id)).await,
            Route::Joke => views::joke(self.api.joke()).await,
            Route::Dashboard => self.dashboard().await,
        }
        Ok(())
    }

    fn login(&mut self, token: Option<String>) -> Result<()> {
        let token = token
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_LOGIN_TOKEN.to_string());
        self.store.set(&token)?;
        info!("Logged in");
        println!("Logged in. Try `fetchgate dashboard`.");
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        self.store.clear()?;
        info!("Logged out");
        println!("Logged out.");
        Ok(())
    }

    fn status(&self) {
        match self.guard.verdict(&self.store) {
            Verdict::Allowed => println!("Session: logged in"),
            Verdict::Denied => println!("Session: logged out"),
        }
    }

    async fn dashboard(&self) {
        let gate = self.guard.admit(&self.store, || {
            let token = self.store.get().unwrap_or_default();
            self.api.with_token(token).users()
        });

        match gate {
            Gate::Render(request) => {
                debug!(url = request.url(), "Dashboard admitted");
                views::dashboard(request).await
            }
            Gate::Redirect(path) => {
                println!("Not logged in. Redirecting to {}", path);
                views::login_page();
            }
        }
    }
}
