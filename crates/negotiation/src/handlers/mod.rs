//! Handler fuer alle eingehenden Steuernachrichten
//!
//! Jeder Handler ist fuer eine Gruppe von Nachrichtentypen zustaendig
//! und arbeitet auf dem gemeinsamen `LocalPeer`.

pub mod anruf_handler;
pub mod verhandlung_handler;
