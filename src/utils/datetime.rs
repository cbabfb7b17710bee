use chrono::Utc;

pub type DateTime = chrono::DateTime<Utc>;

pub fn now() -> DateTime {
    Utc::now()
}

pub trait DateTimeExt {
    // Absolute distance to `other` as an unsigned std duration.
    fn duration_offset(self, other: DateTime) -> std::time::Duration;
}

impl DateTimeExt for DateTime {
    fn duration_offset(self, other: DateTime) -> std::time::Duration {
        let delta = self.signed_duration_since(other);
        let delta = if delta < chrono::Duration::zero() {
            -delta
        } else {
            delta
        };
        delta.to_std().unwrap_or_default()
    }
}
