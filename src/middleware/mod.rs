/*
 * Responsibility
 * - public interface of the middleware layer
 * - http::apply (request id / trace / timeout), appfilter::apply (signature filter)
 */
pub mod appfilter;
pub mod http;
