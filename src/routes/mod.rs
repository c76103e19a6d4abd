/**
 * Routes Module
 * API route handlers
 */

pub mod auth;
pub mod extract;
pub mod favorites;
pub mod health;
pub mod posts;
pub mod tags;
pub mod votes;
