use crate::mailer::OutgoingEmail;

const CARD_STYLE: &str = "background-color:#e5e7eb; padding:24px; border-radius:8px; box-shadow:0 2px 6px rgba(0,0,0,0.1); border:1px solid #d1d5db;";

pub fn verification_email(app_name: &str, email: &str, otp: &str) -> OutgoingEmail {
    let html = format!(
        r#"<div style="{CARD_STYLE}">
  <h1 style="font-weight:bold; font-size:20px;">Welcome to {app}!</h1>
  <p>Hello, {email}, your verification OTP is: <strong>{otp}</strong></p>
  <p>Please use this code to verify your email address. It expires in 10 minutes.</p>
  <p>If you did not request this, please ignore this email.</p>
  <p>Best regards,</p>
  <p>The Safarai Team</p>
</div>"#,
        app = escape_html(app_name),
        email = escape_html(email),
        otp = escape_html(otp),
    );

    OutgoingEmail {
        to: email.to_string(),
        subject: "Verify your account".to_string(),
        html,
    }
}

pub fn password_reset_email(
    app_name: &str,
    email: &str,
    reset_link: &str,
    valid_minutes: i64,
) -> OutgoingEmail {
    let html = format!(
        r#"<div style="{CARD_STYLE}">
  <h1 style="font-weight:bold; font-size:20px;">Welcome to {app}!</h1>
  <p>Hello, {email}</p>
  <p>You requested a password reset. Click the link below to reset your password:</p>
  <a href="{link}" style="color:#2563eb; text-decoration:none; font-weight:bold;">Reset Password</a>
  <p>This link will expire in {valid_minutes} minutes.</p>
  <p>If you did not request this, please ignore this email.</p>
  <p>Best regards,</p>
  <p>The Safarai Team</p>
</div>"#,
        app = escape_html(app_name),
        email = escape_html(email),
        link = escape_html(reset_link),
    );

    OutgoingEmail {
        to: email.to_string(),
        subject: "Reset your password".to_string(),
        html,
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
