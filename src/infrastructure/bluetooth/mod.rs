//! Bluetooth Module
//!
//! Minimal BR/EDR host for classic game controllers: brings the radio
//! controller up, discovers and connects peers, opens their HID channels and
//! configures Wii-family controllers.
//!
//! ## Architecture
//!
//! ```text
//!            radio rx                                   radio tx
//!               │                                          ▲
//!               ▼                                          │
//! ┌──────────────────────────┐                  ┌────────────────────┐
//! │      BluetoothHost       │                  │     Transport      │
//! │  (dispatcher, on_frame)  │── TxQueue ──────▶│ - bounded queue    │
//! └────────────┬─────────────┘                  │ - single credit    │
//!              │                                └────────────────────┘
//!    ┌─────────┼──────────┬─────────────┬────────────┐
//!    ▼         ▼          ▼             ▼            ▼
//! ┌───────┐ ┌────────┐ ┌────────────┐ ┌──────────┐ ┌─────┐
//! │BringUp│ │Scanner │ │ Connection │ │Signaling │ │ Hid │
//! │       │ │        │ │ - steps    │ │ - L2CAP  │ │     │
//! │       │ │        │ │ - pairing  │ │          │ │     │
//! └───────┘ └────────┘ └────────────┘ └──────────┘ └─────┘
//!                          │
//!                          ▼
//!                    PeerTable (7 slots)
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Outbound queue, send credit and transmit pump
//! - [`hci`] / [`l2cap`] / [`protocol`] - Wire formats (HCI, L2CAP signaling, Wii HID reports)
//! - [`commands`] - Command builders and step tables
//! - [`bringup`] - Controller configuration sequence
//! - [`peers`] - Peer slot table
//! - [`scanner`] - Inquiry and inbound connection requests
//! - [`connection`] - Per-peer connection steps and pairing
//! - [`signaling`] - L2CAP channel setup
//! - [`hid`] - Wii HID configuration
//! - [`service`] - Host state and frame dispatcher

pub mod bringup;
pub mod commands;
pub mod connection;
pub mod error;
pub mod hci;
pub mod hid;
pub mod l2cap;
pub mod peers;
pub mod protocol;
pub mod scanner;
pub mod service;
pub mod signaling;
pub mod transport;

// Re-export main service for convenience
pub use service::BluetoothHost;
