use mock_hopsworks::MockHopsworks;

#[tokio::main]
async fn main() {
    let port = std::env::var("MOCK_HOPSWORKS_PORT").unwrap_or_else(|_| "8181".to_string());
    let email = std::env::var("MOCK_HOPSWORKS_EMAIL").unwrap_or_else(|_| "airflow@hopsworks.ai".to_string());
    let password = std::env::var("MOCK_HOPSWORKS_PASSWORD").unwrap_or_else(|_| "airflow".to_string());

    // Registered under its own port so a local `consul` registry config
    // pointing at this process resolves straight back to it.
    let mock = MockHopsworks::new(&email, &password)
        .register_service("glassfish", port.parse().unwrap(), &["http", "hopsworks"])
        .project(119, "demo");

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    println!("MOCK-HOPSWORKS: Listening on http://localhost:{port} (user {email})");
    axum::serve(listener, mock.router()).await.unwrap();
}
