//! Protocol module for mysql-handshake

pub mod mysql;
