//! Service layer: session lifecycle, rounds, reconnects, generation, and exports.

/// Team vote tallying and tie-breaking.
pub mod consensus;
/// OpenAPI documentation generation.
pub mod documentation;
/// Finished-match summary building and export.
pub mod export_service;
/// Health check service.
pub mod health_service;
/// Disconnect grace handling and seat reclamation.
pub mod reconnect_service;
/// Round scheduling, vote intake, and host match controls.
pub mod round_service;
/// Point and review-delay computation.
pub mod scoring;
/// Session lifecycle, joins, and host moderation.
pub mod session_service;
/// Session snapshot projection and broadcasting.
pub mod snapshot_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Background deadline enforcement.
pub mod sweeper;
