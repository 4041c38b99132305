// src/http/block_page.rs
// HTML pages returned for deny, temporary deny and waiting-room verdicts.

pub enum BlockPage {
    Denied,
    TemporarilyDenied,
    Waiting { wait_number: i64 },
}

pub fn render_block_page(page: BlockPage) -> String {
    match page {
        BlockPage::Denied => BLOCK_DENIED_HTML.to_string(),
        BlockPage::TemporarilyDenied => BLOCK_TEMPORARY_HTML.to_string(),
        BlockPage::Waiting { wait_number } => {
            WAITING_ROOM_HTML.replace("{{wait_number}}", &wait_number.max(1).to_string())
        }
    }
}

const BLOCK_DENIED_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Access Blocked</title>
  <style>
    body { font-family: sans-serif; background: #f9f9f9; margin: 2em; }
    .block-container { background: #fff; padding: 2em; border-radius: 8px; box-shadow: 0 2px 8px #ccc; max-width: 480px; margin: auto; }
    h1 { color: #c00; }
  </style>
</head>
<body>
  <div class="block-container">
    <h1>Access Blocked</h1>
    <p>Requests from your address have been blocked.</p>
    <p>If you believe this is an error, contact the site administrator.</p>
  </div>
</body>
</html>
"#;

const BLOCK_TEMPORARY_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Temporarily Blocked</title>
  <style>
    body { font-family: sans-serif; background: #f9f9f9; margin: 2em; }
    .block-container { background: #fff; padding: 2em; border-radius: 8px; box-shadow: 0 2px 8px #ccc; max-width: 480px; margin: auto; }
    h1 { color: #c60; }
  </style>
</head>
<body>
  <div class="block-container">
    <h1>Temporarily Blocked</h1>
    <p>Unusual activity was detected from your connection. Please try again later.</p>
    <p>If you believe this is an error, contact the site administrator.</p>
  </div>
</body>
</html>
"#;

const WAITING_ROOM_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Please Wait</title>
  <style>
    body { font-family: sans-serif; background: #f9f9f9; margin: 2em; }
    .block-container { background: #fff; padding: 2em; border-radius: 8px; box-shadow: 0 2px 8px #ccc; max-width: 480px; margin: auto; }
    h1 { color: #369; }
  </style>
</head>
<body>
  <div class="block-container">
    <h1>Please Wait</h1>
    <p>The site is busy. Your place in line: <strong>{{wait_number}}</strong>.</p>
    <p>This page will let you in as soon as a slot frees up. Refresh in a few seconds.</p>
  </div>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_page_shows_place_in_line() {
        let html = render_block_page(BlockPage::Waiting { wait_number: 3 });
        assert!(html.contains("<strong>3</strong>"));
        assert!(!html.contains("{{wait_number}}"));
    }

    #[test]
    fn waiting_page_never_shows_zero() {
        let html = render_block_page(BlockPage::Waiting { wait_number: 0 });
        assert!(html.contains("<strong>1</strong>"));
    }

    #[test]
    fn deny_pages_differ() {
        assert_ne!(
            render_block_page(BlockPage::Denied),
            render_block_page(BlockPage::TemporarilyDenied)
        );
    }
}
