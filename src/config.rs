use std::time::Duration;

/// Runtime settings shared by the services and worker pools.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Externally reachable base URL, used to build gateway callback URLs.
    pub public_base_url: String,
    /// How long a tracking status stays pollable.
    pub status_ttl: Duration,
    /// Deliveries of one message before it is dead-lettered.
    pub max_delivery_attempts: u32,
    /// Consumers per queue.
    pub workers: usize,
    /// Largest `quantity` one purchase may ask for.
    pub max_tickets_per_purchase: u32,
}

impl ServiceConfig {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn callback_url(&self, path: &str) -> String {
        format!("{}{}", self.public_base_url, path)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            status_ttl: Duration::from_secs(3600),
            max_delivery_attempts: 5,
            workers: 4,
            max_tickets_per_purchase: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_url_strips_trailing_slash() {
        let config = ServiceConfig::new("https://transit.example/");
        assert_eq!(
            config.callback_url("/ticket/payment/success?id=1"),
            "https://transit.example/ticket/payment/success?id=1"
        );
    }
}
