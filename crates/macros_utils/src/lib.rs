//! Small declarative helpers shared by the HTTP server.

/// Generate `pub fn routes(cfg: &mut actix_web::web::ServiceConfig)` for a module
///
/// Every listed handler must be declared with an actix routing attribute.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     route status_route,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:ident),* $(,)?) => {
        pub fn routes(cfg: &mut ::actix_web::web::ServiceConfig) {
            $( cfg.service($handler); )*
        }
    };
}
