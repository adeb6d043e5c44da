/*
 * Responsibility
 * - HTTP API のバージョン単位のまとまり
 */
pub mod v1;
