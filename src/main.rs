#![forbid(unsafe_code)]

use lazy_static::lazy_static;
use log::info;
use poem::{listener::TcpListener, Route};
use poem_openapi::{payload::PlainText, OpenApi, OpenApiService};

// Utilities
use crate::utils::config::{init_log, init_runtime_context, RuntimeCtx};
use crate::utils::config::{GREETING_ARGS, GREETING_DIRS};
use crate::utils::errors::Errors;

// Modules
mod utils;

// ***************************************************************************
//                                Constants
// ***************************************************************************
const SERVER_NAME : &str = "GreetingServer"; // for poem logging

// The fixed response body served on the root path.
const GREETING : &str = "Hello from the Flask Backend!";

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Lazily initialize the parameters variable so that it has a 'static lifetime.
// We exit if we can't read our parameters.
lazy_static! {
    static ref RUNTIME_CTX: RuntimeCtx = init_runtime_context();
}

// ---------------------------------------------------------------------------
// main:
// ---------------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    // --------------- Initialize Server --------------
    // Announce ourselves.
    println!("Starting greeting_server!");

    // Create the data directories and exit when that's all that was requested.
    if GREETING_ARGS.create_dirs_only {
        println!("Created data directories rooted at {}. Exiting.", GREETING_DIRS.root_dir);
        return Ok(());
    }

    // Initialize the server.
    greeting_init();

    // --------------- Main Loop Set Up ---------------
    // Create the routes.
    let app = build_app();

    // Assign the bind address.
    let addr = format!("{}:{}",
        RUNTIME_CTX.parms.config.http_addr,
        RUNTIME_CTX.parms.config.http_port);
    info!("Listening for HTTP requests at {}.", addr);

    // ------------------ Main Loop -------------------
    poem::Server::new(TcpListener::bind(addr))
        .name(SERVER_NAME)
        .run(app)
        .await
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// greeting_init:
// ---------------------------------------------------------------------------
/** Initialize all subsystems and data structures other than those needed
 * to configure the main loop processor.
 */
fn greeting_init() {
    // Configure our log.
    init_log();

    // Force the reading of input parameters and initialization of the
    // runtime context.
    info!("{}", Errors::InputParms(format!("{:#?}", *RUNTIME_CTX)));

    // Log build info.
    print_version_info();
}

// ---------------------------------------------------------------------------
// build_app:
// ---------------------------------------------------------------------------
/** Assemble the route table.  The greeting service owns the whole path space
 * rooted at /; requests that don't match its one operation get the
 * framework's default responses.
 */
fn build_app() -> Route {
    let api_service = OpenApiService::new(GreetingApi, "Greeting Server",
        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"));
    Route::new().nest("/", api_service)
}

// ---------------------------------------------------------------------------
// print_version_info:
// ---------------------------------------------------------------------------
fn print_version_info() {
    // Log build info.
    info!("{}.", format!("\n*** Running GreetingServer={}, BRANCH={}, COMMIT={}, RUSTC={}",
                        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
                        env!("GIT_BRANCH"),
                        env!("GIT_COMMIT_SHORT"),
                        env!("RUSTC_VERSION")),
    );
}

// ***************************************************************************
//                            Greeting Endpoint
// ***************************************************************************
// Greeting structure.
struct GreetingApi;

// ---------------------------------------------------------------------------
// greeting endpoint:
// ---------------------------------------------------------------------------
#[OpenApi]
impl GreetingApi {
    /** The only route this server exposes.  Nothing is read from the request
     * and the response never varies.
     */
    #[oai(path = "/", method = "get")]
    async fn get_greeting(&self) -> PlainText<String> {
        PlainText(GREETING.to_string())
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use poem::http::{header, Method, StatusCode, Uri};
    use poem::test::TestClient;
    use poem::{Endpoint, Request};

    use super::{build_app, GREETING};

    #[tokio::test]
    async fn get_root_returns_greeting() {
        let cli = TestClient::new(build_app());
        let resp = cli.get("/").send().await;
        resp.assert_status_is_ok();
        resp.assert_text(GREETING).await;
    }

    #[tokio::test]
    async fn query_parameters_are_ignored() {
        let cli = TestClient::new(build_app());
        let resp = cli.get("/").query("x", &"1").send().await;
        resp.assert_status_is_ok();
        resp.assert_text(GREETING).await;
    }

    #[tokio::test]
    async fn repeated_requests_are_byte_identical() {
        let app = build_app();
        let first = body_of(&app).await;
        let second = body_of(&app).await;
        assert_eq!(first, second);
        assert_eq!(first, GREETING.as_bytes());
    }

    #[tokio::test]
    async fn plaintext_content_type() {
        let app = build_app();
        let req = Request::builder().uri(Uri::from_static("/")).finish();
        let resp = app.get_response(req).await;
        let content_type = resp.headers().get(header::CONTENT_TYPE)
            .expect("content type header")
            .to_str()
            .expect("readable header");
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let cli = TestClient::new(build_app());
        let resp = cli.get("/missing").send().await;
        resp.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_get_method_is_rejected() {
        let app = build_app();
        let req = Request::builder()
            .method(Method::POST)
            .uri(Uri::from_static("/"))
            .finish();
        let resp = app.get_response(req).await;
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn bind_conflict_fails_before_serving() {
        use poem::listener::{Listener, TcpListener};

        let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("ephemeral bind");
        let addr = occupied.local_addr().expect("local addr");
        let clash = TcpListener::bind(addr.to_string()).into_acceptor().await;
        assert!(clash.is_err());
    }

    // Fetch the root path and return the raw response body.
    async fn body_of<E: Endpoint>(app: &E) -> Vec<u8> {
        let req = Request::builder().uri(Uri::from_static("/")).finish();
        let resp = app.get_response(req).await;
        resp.into_body().into_vec().await.expect("readable body")
    }
}
