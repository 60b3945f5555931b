//! Campaign HTML wrapper

use uuid::Uuid;

const FOOTER_ICON: &str = "https://cdn-icons-png.flaticon.com/512/561/561127.png";
const FOOTER_NOTE: &str =
    "Este correo forma parte de una comunicación masiva enviada con fines informativos.";

/// Public URL of the open-tracking pixel for one recipient.
pub fn tracking_url(base_url: &str, token: Uuid) -> String {
    format!("{}/track/{}", base_url.trim_end_matches('/'), token)
}

/// Wrap a campaign body in the card layout with the hidden tracking pixel.
///
/// The body is trusted HTML written by the campaign author and is inserted
/// as-is.
pub fn render_campaign(body: &str, pixel_url: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; background: #f9f9f9; padding: 32px;">
  <div style="max-width: 600px; margin: auto; background: #fff; border-radius: 8px; box-shadow: 0 2px 8px #eee; padding: 24px;">
    <div>{body}</div>
    <hr style="margin: 32px 0;">
    <img src="{pixel_url}" width="1" height="1" style="display:none" alt="" />
    <div style="text-align: center; color: #888; font-size: 11px;">
      <img src="{FOOTER_ICON}" alt="" width="24" style="margin-bottom: 4px;" />
      <br>
      {FOOTER_NOTE}
    </div>
  </div>
</div>"#
    )
}
