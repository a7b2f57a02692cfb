//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, loans, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bookshelf API",
        version = "0.1.0",
        description = "Book catalog and lending ledger REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        // Loans
        loans::get_user_loans,
        loans::borrow_book,
        loans::return_book,
    ),
    components(
        schemas(
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::user::User,
            crate::models::user::CreateUser,
            crate::models::loan::Loan,
            crate::models::loan::LoanRequest,
            loans::LoanResponse,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "users", description = "User registry"),
        (name = "loans", description = "Borrow and return")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
