// Configuration
pub mod config;

// Entity model and typed errors
pub mod entity;
pub mod error;

// Wire protocol and surrogate sanitizing
pub mod protocol;

// Canonical state, one service per entity kind
pub mod service;

// Command routing and handlers
pub mod dispatch;

// Connection registry and WebSocket pumping
pub mod subscription;

// HTTP and WebSocket APIs
pub mod api;

// Client-side mirror
pub mod client;
