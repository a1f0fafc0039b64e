//! Integration tests for flashsync-card
//!
//! Uses wiremock to simulate the card's CGI interface and verifies
//! end-to-end behavior of the transfer primitive, the command sentinels
//! and recursive listing.

mod common;

mod test_commands;
