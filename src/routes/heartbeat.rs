/// Liveness check, served outside bearer auth.
pub async fn heartbeat() -> &'static str {
    "Alive!"
}
