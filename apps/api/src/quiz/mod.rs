// Adaptive career quiz: per-stage questionnaire engine, the cluster → domain
// → role pipeline that chains engines, and the HTTP surface over sessions.

pub mod answer;
pub mod catalog;
pub mod engine;
pub mod handlers;
pub mod pipeline;
pub mod ranking;
pub mod sessions;
