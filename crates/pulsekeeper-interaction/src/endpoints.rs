//! Remote endpoint addresses and browser-like request headers.

pub const LOGOUT_URL: &str = "https://auth.roblox.com/v2/logout";
pub const AUTHENTICATED_USER_URL: &str = "https://users.roblox.com/v1/users/authenticated";
pub const AVATAR_HEADSHOT_URL: &str = "https://thumbnails.roblox.com/v1/users/avatar-headshot";
pub const HOME_URL: &str = "https://www.roblox.com/home";
pub const PULSE_URL: &str = "https://apis.roblox.com/user-heartbeats-api/pulse";
pub const PRESENCE_URL: &str = "https://presence.roblox.com/v1/presence/users";

pub const ORIGIN: &str = "https://www.roblox.com";
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
pub const JSON_ACCEPT: &str = "application/json, text/plain, */*";
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

pub const CSRF_HEADER: &str = "x-csrf-token";

/// Redirects followed when navigating to the home page.
pub const MAX_REDIRECTS: usize = 5;

/// Query string for a 150x150 PNG headshot of `user_id`.
pub fn avatar_query(user_id: u64) -> [(&'static str, String); 4] {
    [
        ("userIds", user_id.to_string()),
        ("size", "150x150".to_string()),
        ("format", "Png".to_string()),
        ("isCircular", "false".to_string()),
    ]
}
