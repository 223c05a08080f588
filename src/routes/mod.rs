/// Router Module Index
///
/// The blog answers on two surfaces over the same service layer. Neither router
/// carries an auth layer: handlers that write take an `AuthUser` (API) or call
/// `Session::require` (pages), so anonymous requests are turned away before any
/// record is touched.

/// JSON API under `/users`, `/posts`, `/comments`, `/categories` and `/auth`.
pub mod api;

/// Server-rendered pages, plus `/health`.
pub mod pages;
