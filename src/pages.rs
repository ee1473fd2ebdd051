use crate::catalog::CatalogRow;
use std::fmt::Write;

const STYLE: &str = r#"<style>
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Arial, sans-serif; background: #f0f2f5; margin: 0; padding: 20px; text-align: center; }
.card { max-width: 720px; margin: 0 auto 24px; background: #fff; border-radius: 15px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); padding: 20px; }
.input-group { display: flex; gap: 10px; }
input[type=text] { flex: 1; padding: 12px; border: 1px solid #ddd; border-radius: 8px; font-size: 16px; }
button, .button { padding: 12px 24px; background: #007bff; color: #fff; border: none; border-radius: 8px; font-size: 16px; cursor: pointer; text-decoration: none; display: inline-block; }
button:disabled { background: #ccc; }
#chat-log { text-align: left; min-height: 120px; margin-top: 16px; }
.msg { margin: 8px 0; line-height: 1.5; }
.msg.user { color: #007bff; }
.msg img, .gallery img { max-width: 100%; border-radius: 10px; margin-top: 10px; }
.gallery { display: grid; grid-template-columns: repeat(auto-fill, minmax(200px, 1fr)); gap: 12px; }
.gallery figure { margin: 0; }
.gallery figcaption { font-size: 0.85rem; color: #555; }
</style>"#;

const CHAT_SCRIPT: &str = r#"<script>
function escapeHtml(text) {
    const div = document.createElement('div');
    div.innerText = text;
    return div.innerHTML;
}
function renderAnswer(text) {
    return escapeHtml(text)
        .replace(/!\[([^\]]*)\]\((https?:\/\/[^)\s]+)\)/g, '<img src="$2" alt="$1">')
        .replace(/\n/g, '<br>');
}
async function ask() {
    const input = document.getElementById('user-input');
    const log = document.getElementById('chat-log');
    const btn = document.getElementById('ask-btn');
    const query = input.value.trim();
    if (!query) return;

    log.insertAdjacentHTML('beforeend', `<p class="msg user">${escapeHtml(query)}</p>`);
    input.value = '';
    btn.disabled = true;
    try {
        const res = await fetch('/ask', {
            method: 'POST',
            headers: {'Content-Type': 'application/json'},
            body: JSON.stringify({ query })
        });
        const data = await res.json();
        let html = `<div class="msg">${renderAnswer(data.answer)}`;
        if (data.image_url) {
            html += `<img src="${encodeURI(data.image_url)}" alt="result">`;
        }
        if (data.show_payment) {
            html += `<p><a class="button" href="/payment">Buy</a></p>`;
        }
        log.insertAdjacentHTML('beforeend', html + '</div>');
    } catch (err) {
        log.insertAdjacentHTML('beforeend', '<p class="msg" style="color:red">Something went wrong.</p>');
        console.error(err);
    } finally {
        btn.disabled = false;
    }
}
</script>"#;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"ko\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{}</title>\n{}\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        STYLE,
        body
    )
}

fn gallery(rows: &[&CatalogRow]) -> String {
    if rows.is_empty() {
        return "<p>No images yet.</p>".to_string();
    }

    let mut out = String::from("<div class=\"gallery\">");
    for row in rows {
        let _ = write!(
            out,
            "<figure><img src=\"{url}\" alt=\"{desc}\"><figcaption>{desc}</figcaption></figure>",
            url = escape_html(&row.url),
            desc = escape_html(&row.description),
        );
    }
    out.push_str("</div>");
    out
}

/// Chat box, upload form and the catalog, newest upload first.
pub fn index(rows: &[CatalogRow]) -> String {
    let newest_first: Vec<&CatalogRow> = rows.iter().rev().collect();
    let body = format!(
        "<div class=\"card\">\n<h1>AI Image Curator</h1>\n\
         <div class=\"input-group\">\n\
         <input type=\"text\" id=\"user-input\" placeholder=\"e.g. a bright painting of a mountain\" \
         onkeydown=\"if(event.key==='Enter') ask()\">\n\
         <button id=\"ask-btn\" onclick=\"ask()\">Search</button>\n</div>\n\
         <div id=\"chat-log\"></div>\n</div>\n\
         <div class=\"card\">\n<h2>Upload</h2>\n\
         <form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"image\" accept=\"image/*\">\n\
         <button type=\"submit\">Upload</button>\n</form>\n</div>\n\
         <div class=\"card\">\n<h2>Gallery</h2>\n{}\n</div>\n{}",
        gallery(&newest_first),
        CHAT_SCRIPT
    );
    layout("AI Image Curator", &body)
}

pub fn payment(rows: &[CatalogRow]) -> String {
    let ordered: Vec<&CatalogRow> = rows.iter().collect();
    let body = format!(
        "<div class=\"card\">\n<h1>Checkout</h1>\n{}\n\
         <p><a class=\"button\" href=\"/success\">Pay</a></p>\n</div>",
        gallery(&ordered)
    );
    layout("Checkout", &body)
}

pub fn success() -> String {
    layout(
        "Payment complete",
        "<div class=\"card\">\n<h1>Payment complete</h1>\n\
         <p>Thank you for your purchase.</p>\n\
         <p><a class=\"button\" href=\"/\">Back to gallery</a></p>\n</div>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(desc: &str, url: &str) -> CatalogRow {
        CatalogRow {
            description: desc.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b>\"Tom\" & 'Jerry'</b>"),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn index_lists_newest_first() {
        let rows = vec![row("old", "https://x/old.png"), row("new", "https://x/new.png")];
        let html = index(&rows);
        let new_at = html.find("https://x/new.png").unwrap();
        let old_at = html.find("https://x/old.png").unwrap();
        assert!(new_at < old_at);
        assert!(html.contains("name=\"image\""));
    }

    #[test]
    fn payment_keeps_upload_order_and_escapes() {
        let rows = vec![row("a <script>", "https://x/a.png"), row("b", "https://x/b.png")];
        let html = payment(&rows);
        assert!(html.find("https://x/a.png").unwrap() < html.find("https://x/b.png").unwrap());
        assert!(html.contains("a &lt;script&gt;"));
        assert!(!html.contains("a <script>"));
    }

    #[test]
    fn empty_gallery_has_placeholder() {
        assert!(index(&[]).contains("No images yet."));
    }
}
