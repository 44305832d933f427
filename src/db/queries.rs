pub const SCAN_EVENTS_FIRST_PAGE: &str = r#"
SELECT event_id, event_type, latitude, longitude, title, created_at, comments
FROM events
ORDER BY event_id
LIMIT $1;
"#;

pub const SCAN_EVENTS_AFTER: &str = r#"
SELECT event_id, event_type, latitude, longitude, title, created_at, comments
FROM events
WHERE event_id > $1
ORDER BY event_id
LIMIT $2;
"#;

pub const SCAN_USERS_FIRST_PAGE: &str = r#"
SELECT user_id, display_name, latitude, longitude, notifications_enabled, push_token, email, account_type
FROM users
ORDER BY user_id
LIMIT $1;
"#;

pub const SCAN_USERS_AFTER: &str = r#"
SELECT user_id, display_name, latitude, longitude, notifications_enabled, push_token, email, account_type
FROM users
WHERE user_id > $1
ORDER BY user_id
LIMIT $2;
"#;

pub const DELETE_ALL_EVENTS: &str = r#"
DELETE FROM events;
"#;

pub const INSERT_EVENT: &str = r#"
INSERT INTO events (event_id, event_type, latitude, longitude, title, created_at, comments)
VALUES ($1, $2, $3, $4, $5, $6, '[]'::jsonb)
ON CONFLICT (event_id) DO UPDATE
SET event_type = EXCLUDED.event_type,
    latitude = EXCLUDED.latitude,
    longitude = EXCLUDED.longitude,
    title = EXCLUDED.title,
    created_at = EXCLUDED.created_at;
"#;
