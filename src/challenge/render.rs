// src/challenge/render.rs

/// Where the challenge form posts to. The HTTP entrypoint answers it by
/// setting the pass cookie.
pub const PASS_PATH: &str = "/__gate/pass";

pub fn render_challenge_form(action: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Verification Required</title>
  <style>
    body {{ font-family: sans-serif; background: #f9f9f9; margin: 2em; }}
    .block-container {{ background: #fff; padding: 2em; border-radius: 8px; box-shadow: 0 2px 8px #ccc; max-width: 480px; margin: auto; }}
    h1 {{ color: #c60; }}
    button {{ padding: 0.6em 1.4em; font-size: 1em; }}
  </style>
</head>
<body>
  <div class="block-container">
    <h1>Verification Required</h1>
    <p>Unusual activity was detected from your connection. Confirm you are a person to continue.</p>
    <form method="POST" action="{action}">
      <button type="submit">Continue</button>
    </form>
  </div>
</body>
</html>
"#,
        action = action
    )
}
