use scraper::{Html, Selector};
use url::Url;

use crate::error::{Result, ScraperError};
use crate::fetch::Fetcher;

/// Credentials for an HTML form login; the session cookie stays in the
/// fetcher's cookie store afterwards.
#[derive(Debug, Clone)]
pub struct FormLogin {
    pub url: Url,
    pub fields: Vec<(String, String)>,
    /// Must match on the page returned by the POST for the login to count.
    pub success_selector: Option<String>,
}

pub async fn login(fetcher: &Fetcher, form: &FormLogin) -> Result<()> {
    log::info!("🔑 Logging in at {}", form.url);

    let success = form
        .success_selector
        .as_deref()
        .map(|css| {
            Selector::parse(css)
                .map_err(|e| ScraperError::InvalidSelector(format!("{}: {}", css, e)))
        })
        .transpose()?;

    let page = fetcher.get(&form.url).await?;
    let (action, mut pairs) = form_fields(&page.body, &page.url);

    for (name, value) in &form.fields {
        match pairs.iter_mut().find(|(n, _)| n == name) {
            Some(pair) => pair.1 = value.clone(),
            None => pairs.push((name.clone(), value.clone())),
        }
    }
    log::debug!(
        "Submitting {} field(s) to {}",
        pairs.len(),
        action
    );

    let response = fetcher
        .post_form(&action, &pairs)
        .await
        .map_err(|e| ScraperError::Login(e.to_string()))?;

    if let Some(success) = success {
        let document = Html::parse_document(&response.body);
        if document.select(&success).next().is_none() {
            return Err(ScraperError::Login(format!(
                "no element matching '{}' after submitting to {}",
                form.success_selector.as_deref().unwrap_or_default(),
                action
            )));
        }
    }

    log::info!("Logged in, session cookie kept for the crawl");
    Ok(())
}

/// Action URL and pre-filled inputs (hidden tokens included) of the first
/// form on the page.
pub fn form_fields(html: &str, page_url: &Url) -> (Url, Vec<(String, String)>) {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse("form").unwrap();
    let input_selector = Selector::parse("input[name]").unwrap();

    let Some(form) = document.select(&form_selector).next() else {
        return (page_url.clone(), Vec::new());
    };

    let action = form
        .value()
        .attr("action")
        .filter(|a| !a.trim().is_empty())
        .and_then(|a| page_url.join(a).ok())
        .unwrap_or_else(|| page_url.clone());

    let pairs = form
        .select(&input_selector)
        .filter(|input| {
            !matches!(
                input.value().attr("type").map(str::to_lowercase).as_deref(),
                Some("submit" | "button" | "image" | "reset")
            )
        })
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or("");
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    (action, pairs)
}
