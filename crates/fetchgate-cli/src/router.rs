use anyhow::{bail, Context, Result};

/// Post shown when `post` is given no id
const DEFAULT_POST_ID: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login(Option<String>),
    Logout,
    Status,
    Users,
    Posts,
    Post(i64),
    Joke,
    Dashboard,
}

impl Route {
    /// Parse command-line arguments (program name excluded)
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(command) = args.first() else {
            return Ok(Route::Home);
        };
        let arg = args.get(1);

        Ok(match command.trim_start_matches('/') {
            "" | "home" | "help" | "--help" | "-h" => Route::Home,
            "login" => Route::Login(arg.cloned()),
            "logout" => Route::Logout,
            "status" => Route::Status,
            "users" => Route::Users,
            "posts" => Route::Posts,
            "post" => match arg {
                Some(id) => Route::Post(
                    id.parse()
                        .with_context(|| format!("Invalid post id: {}", id))?,
                ),
                None => Route::Post(DEFAULT_POST_ID),
            },
            "joke" => Route::Joke,
            "dashboard" => Route::Dashboard,
            other => bail!("Unknown command: {} (try `fetchgate help`)", other),
        })
    }
}
