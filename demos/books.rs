//! A small books API showing ordered routes, declines, status handlers and
//! hooks.
//!
//! Run with:
//!   cargo run --example books
//!   RUST_LOG=books=debug,waypost=debug cargo run --example books   # dispatch details
//!
//! Try:
//!   curl http://localhost:3000/books
//!   curl http://localhost:3000/books/1
//!   curl http://localhost:3000/books/dune          # slug route, after the id route declines
//!   curl -X POST http://localhost:3000/books -d '{"title":"Emma"}'
//!   curl -X POST http://localhost:3000/books -d 'nope'   # 400, reshaped by the status handler
//!   curl -X DELETE http://localhost:3000/books/1   # 405 with Allow
//!   curl http://localhost:3000/nowhere             # 404 from on_not_found

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use waypost::{Context, Decline, HttpError, IntoReply, Json, Reply, Response, Router, Server, StatusRange};

#[derive(Clone, Serialize)]
struct Book {
    id: u32,
    slug: &'static str,
    title: &'static str,
}

const BOOKS: &[Book] = &[
    Book { id: 1, slug: "dune",   title: "Dune" },
    Book { id: 2, slug: "emma",   title: "Emma" },
    Book { id: 3, slug: "ulysses", title: "Ulysses" },
];

#[derive(Deserialize)]
struct NewBook {
    title: String,
}

#[tokio::main]
async fn main() -> Result<(), waypost::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "books=info,waypost=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app = Router::new()
        .get("/books",          list_books)
        .get("/books/:id",      book_by_id)
        .get("/books/:slug",    book_by_slug)
        .post("/books",         create_book)
        .on_status(StatusRange::Error, shape_errors)
        .on_not_found(|nf| {
            Some(Response::builder().status(nf.response.status_code()).json(
                json!({ "error": "no such resource", "path": nf.event.request().path() }).to_string(),
            ))
        })
        .on_handled(|h| {
            tracing::info!(
                status = h.response.map(|r| r.status_code().as_u16()),
                route = h.route.map(|r| r.pattern()),
                elapsed_us = h.duration.as_micros() as u64,
                "handled"
            );
        });

    Server::bind("0.0.0.0:3000").serve(app).await
}

// GET /books
async fn list_books(_ctx: Context) -> Json<&'static [Book]> {
    Json(BOOKS)
}

// GET /books/:id — declines anything that is not a number, so the slug
// route registered after it gets a turn.
async fn book_by_id(ctx: Context) -> Result<Reply, HttpError> {
    let Some(id) = ctx.param("id").and_then(|id| id.parse::<u32>().ok()) else {
        return Ok(Reply::Decline);
    };
    match BOOKS.iter().find(|b| b.id == id) {
        Some(book) => Ok(Reply::Response(Response::json(serde_json::to_vec(book)?))),
        None => Err(HttpError::new(StatusCode::NOT_FOUND, format!("no book with id {id}"))),
    }
}

// GET /books/:slug
async fn book_by_slug(ctx: Context) -> Result<Reply, HttpError> {
    let slug = ctx.param("slug").unwrap_or_default();
    match BOOKS.iter().find(|b| b.slug == slug) {
        Some(book) => Json(book.clone()).into_reply(),
        None => Decline.into_reply(),
    }
}

// POST /books
async fn create_book(ctx: Context) -> Result<Response, HttpError> {
    let input: NewBook = ctx.json()?;
    ctx.response_headers().set("location", "/books/4")?;
    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .json(json!({ "id": 4, "title": input.title }).to_string()))
}

// Every 4xx/5xx leaves with the same envelope.
async fn shape_errors(_ctx: Context, status: StatusCode, current: Response) -> Option<Response> {
    if current.content_type() == Some("application/json") {
        return None;
    }
    Some(Response::builder().status(status).json(
        json!({ "error": status.canonical_reason().unwrap_or("error") }).to_string(),
    ))
}
