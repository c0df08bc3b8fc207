use super::*;

impl Default for AmberConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: "https://api.amber.com.au/v1".to_string(),
            site_id: String::new(),
            previous_intervals: 2,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            username: String::new(),
            password: String::new(),
            topic_prefix: "amber".to_string(),
            keep_alive_seconds: 60,
            retain: false,
        }
    }
}

impl Default for TariffsConfig {
    fn default() -> Self {
        Self {
            import: StaticTariff {
                fixed_charge: 0.0,
                loss_factor: 1.0,
            },
            export: StaticTariff {
                fixed_charge: 0.0,
                loss_factor: 1.0,
            },
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            bid_cadence_minutes: 5,
            settled_cadence_minutes: 30,
            lag_allowance_seconds: 10,
            min_poll_interval_seconds: 30,
            wait_granularity_seconds: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/pricerelay.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            amber: AmberConfig::default(),
            mqtt: MqttConfig::default(),
            tariffs: TariffsConfig::default(),
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig::default(),
            timezone: "Australia/Brisbane".to_string(),
        }
    }
}
