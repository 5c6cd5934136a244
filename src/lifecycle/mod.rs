/*
 * ALPHA SOVEREIGN - THREAD LIFECYCLE PRIMITIVES
 * =================================================================
 * Component Name: src/lifecycle/mod.rs
 * Core Responsibility: أدوات التنسيق بين المستدعي والخيط العامل: الإلغاء، الإقلاع، التخلص.
 * Design Pattern: Module Facade
 * =================================================================
 */

pub mod bootstrap;
pub mod cancellation;
pub mod dispose;

pub use bootstrap::{BootstrapCoordinator, BootstrapState};
pub use cancellation::CancellationSignal;
pub use dispose::{DisposeCoordinator, ExitGuard, Participant};
