/*
 * Responsibility
 * - forward-auth のモジュール構成 (binary は app::run() を呼ぶだけ)
 */
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
