mod helpers;
mod indexing;
mod swap;
mod triggers;
