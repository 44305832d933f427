use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: String,
    pub display_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notifications_enabled: bool,
    pub push_token: Option<String>,
    pub email: Option<String>,
    pub account_type: Option<String>,
}

impl User {
    /// Last known location, if the client has reported both coordinates.
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }

    /// Token to push to. `None` whenever the user has opted out.
    pub fn push_target(&self) -> Option<&str> {
        if !self.notifications_enabled {
            return None;
        }
        self.push_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(enabled: bool, token: Option<&str>) -> User {
        User {
            user_id: "u-1".to_string(),
            display_name: "Ana".to_string(),
            latitude: Some(19.43),
            longitude: Some(-99.13),
            notifications_enabled: enabled,
            push_token: token.map(str::to_string),
            email: None,
            account_type: Some("standard".to_string()),
        }
    }

    #[test]
    fn test_push_target_respects_opt_out() {
        assert_eq!(user(true, Some("tok")).push_target(), Some("tok"));
        assert_eq!(user(false, Some("tok")).push_target(), None);
        assert_eq!(user(true, Some("   ")).push_target(), None);
        assert_eq!(user(true, None).push_target(), None);
    }

    #[test]
    fn test_location_requires_both_coordinates() {
        let mut u = user(true, Some("tok"));
        assert_eq!(u.location(), Some((19.43, -99.13)));
        u.longitude = None;
        assert_eq!(u.location(), None);
        u.longitude = Some(f64::NAN);
        assert_eq!(u.location(), None);
    }
}
