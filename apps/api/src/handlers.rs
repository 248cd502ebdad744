pub mod captcha;
pub mod health;
pub mod history;
