/// Client-side match reconciliation and auto-confirm.
pub mod client_sync;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Lineup hand-off and locking.
pub mod lineup_service;
/// Per-game scoring workflow and match reads.
pub mod scoring_service;
/// Fixture loading for the in-memory store.
pub mod seed;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
