use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub api_token: String,
    /// Share of the booking total refunded when a paid booking is cancelled
    /// after its scheduled start.
    pub refund_after_start_percent: u8,
    /// Probability that the simulated gateway reports a charge as successful.
    pub gateway_success_rate: f64,
    pub gateway_webhook_secret: String,
    pub invoice_prefix: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "caredesk.db".to_string()),
            api_token: env::var("API_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            refund_after_start_percent: env::var("REFUND_AFTER_START_PERCENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|p| *p <= 100)
                .unwrap_or(50),
            gateway_success_rate: env::var("GATEWAY_SUCCESS_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|r: &f64| (0.0..=1.0).contains(r))
                .unwrap_or(0.9),
            gateway_webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET").unwrap_or_default(),
            invoice_prefix: env::var("INVOICE_PREFIX").unwrap_or_else(|_| "INV-".to_string()),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
        }
    }

    pub fn twilio_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty()
            && !self.twilio_auth_token.is_empty()
            && !self.twilio_phone_number.is_empty()
    }
}
