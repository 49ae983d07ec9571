//! Plain-text views. Each data view owns one request controller for as
//! long as it is on screen.

use tracing::info;

use fetchgate_core::models::{Joke, Post, User};
use fetchgate_core::{CancelableRequest, FetchState, RequestController};

pub fn home() {
    println!("fetchgate");
    println!();
    println!("  login [TOKEN]  store a session token");
    println!("  logout         clear the session token");
    println!("  status         show whether a session token is present");
    println!("  users          list users");
    println!("  posts          list post titles");
    println!("  post [ID]      show a post title");
    println!("  joke           fetch a dad joke");
    println!("  dashboard      protected view, requires login");
}

pub fn login_page() {
    println!("Login Page");
    println!("Run `fetchgate login [TOKEN]` to sign in.");
}

/// Mount a controller, run `request` and render the settled state.
///
/// Ctrl-C tears the view down: the controller is deactivated and nothing
/// further is rendered.
async fn fetch_view<T, R>(heading: &str, request: R, render: impl FnOnce(&T))
where
    T: Send + 'static,
    R: CancelableRequest<Output = T>,
{
    println!("{}", heading);

    let mut controller = RequestController::new();
    controller.activate(|| request);
    println!("Loading...");

    let interrupted = tokio::select! {
        _ = controller.wait_settled() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        controller.deactivate();
        info!("View closed before the request settled");
        return;
    }

    if !controller.status().is_terminal() {
        return;
    }
    match controller.state() {
        FetchState::Succeeded(data) => render(data),
        state => match failure_text(state) {
            Some(error) => println!("{}", error),
            None => info!(status = %state.status(), "Request settled without data"),
        },
    }
}

/// Text shown for a settled cycle without data. Cancellation shows nothing.
fn failure_text<T>(state: &FetchState<T>) -> Option<&str> {
    match state {
        FetchState::Failed(error) => Some(error.as_str()),
        _ => None,
    }
}

fn print_users(users: &[User]) {
    for user in users {
        println!("  {} - {}", user.name, user.email);
    }
}

pub async fn users<R>(request: R)
where
    R: CancelableRequest<Output = Vec<User>>,
{
    fetch_view("Fetched Users", request, |users: &Vec<User>| print_users(users)).await;
}

pub async fn post<R>(request: R)
where
    R: CancelableRequest<Output = Post>,
{
    fetch_view("Fetched Title", request, |post: &Post| println!("{}", post.title)).await;
}

pub async fn posts<R>(request: R)
where
    R: CancelableRequest<Output = Vec<Post>>,
{
    fetch_view("Fetched Posts", request, |posts: &Vec<Post>| {
        for post in posts {
            println!("  {}. {}", post.id, post.title);
        }
    })
    .await;
}

pub async fn joke<R>(request: R)
where
    R: CancelableRequest<Output = Joke>,
{
    fetch_view("Dad Joke", request, |joke: &Joke| println!("{}", joke.joke)).await;
}

pub async fn dashboard<R>(request: R)
where
    R: CancelableRequest<Output = Vec<User>>,
{
    fetch_view("Dashboard", request, |users: &Vec<User>| {
        println!("Welcome back. {} users on record.", users.len());
        print_users(users);
    })
    .await;
}
