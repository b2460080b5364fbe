//! Recipes: the selectors, field names and pagination rules for one site,
//! kept as data so a single crawler can serve every site.

use std::path::Path;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ScraperError};
use crate::record::Record;

const BOOKS: &str = include_str!("../recipes/books.json");
const BOOKS_DETAIL: &str = include_str!("../recipes/books-detail.json");
const QUOTES: &str = include_str!("../recipes/quotes.json");

pub const BUILTIN: &[&str] = &["books", "books-detail", "quotes"];

/// Every record carries its page URL under this name.
pub const RESERVED_FIELD: &str = "source";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub start_urls: Vec<String>,
    #[serde(default)]
    pub item: Option<ItemRule>,
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub follow: Option<String>,
    #[serde(default)]
    pub detail: Option<ItemRule>,
    #[serde(default = "default_same_domain")]
    pub same_domain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRule {
    /// Element that delimits one item; the whole page when absent.
    #[serde(default)]
    pub selector: Option<String>,
    pub fields: Vec<FieldRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub all: bool,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub url: bool,
}

fn default_same_domain() -> bool {
    true
}

fn default_separator() -> String {
    String::from(", ")
}

impl FieldRule {
    /// Parse the CLI shorthand `name=css` or `name=css@attr`.
    pub fn from_shorthand(shorthand: &str) -> Result<Self> {
        let (name, rest) = shorthand.split_once('=').ok_or_else(|| {
            ScraperError::Recipe(format!("expected name=selector, got '{shorthand}'"))
        })?;
        let (selector, attr) = match rest.rsplit_once('@') {
            Some((sel, attr)) if !attr.is_empty() && !attr.contains([' ', ']']) => {
                (sel, Some(attr.to_string()))
            }
            _ => (rest, None),
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(ScraperError::Recipe(format!("empty field name in '{shorthand}'")));
        }

        Ok(Self {
            name: name.to_string(),
            selector: (!selector.trim().is_empty()).then(|| selector.trim().to_string()),
            url: matches!(attr.as_deref(), Some("href" | "src")),
            attr,
            all: false,
            separator: default_separator(),
            pattern: None,
        })
    }
}

impl Recipe {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// A built-in recipe by name, or a JSON file path.
    pub fn load(name_or_path: &str) -> Result<Self> {
        match name_or_path {
            "books" => Self::from_json(BOOKS),
            "books-detail" => Self::from_json(BOOKS_DETAIL),
            "quotes" => Self::from_json(QUOTES),
            path => {
                let json = std::fs::read_to_string(Path::new(path))?;
                Self::from_json(&json)
            }
        }
    }

    /// Recipe assembled from command-line selectors.
    pub fn ad_hoc(item: Option<String>, fields: Vec<FieldRule>, next_page: Option<String>) -> Self {
        Self {
            name: "ad-hoc".to_string(),
            start_urls: Vec::new(),
            item: Some(ItemRule {
                selector: item,
                fields,
            }),
            next_page,
            follow: None,
            detail: None,
            same_domain: true,
        }
    }

    pub fn compile(&self) -> Result<CompiledRecipe> {
        if self.item.is_none() && self.detail.is_none() {
            return Err(ScraperError::Recipe(format!(
                "recipe '{}' has neither an item nor a detail rule",
                self.name
            )));
        }
        if self.detail.is_some() && self.follow.is_none() {
            if self.item.is_some() {
                return Err(ScraperError::Recipe(format!(
                    "recipe '{}' has a detail rule but no follow selector to reach detail pages",
                    self.name
                )));
            }
            log::info!(
                "Recipe '{}' has only a detail rule; start URLs are scraped as detail pages",
                self.name
            );
        }
        if let Some(field) = self
            .item
            .iter()
            .chain(self.detail.iter())
            .flat_map(|rule| rule.fields.iter())
            .find(|field| field.name == RESERVED_FIELD)
        {
            return Err(ScraperError::Recipe(format!(
                "field name '{}' is reserved for the page URL",
                field.name
            )));
        }

        Ok(CompiledRecipe {
            name: self.name.clone(),
            item: self.item.as_ref().map(CompiledItem::compile).transpose()?,
            next_page: self.next_page.as_deref().map(parse_selector).transpose()?,
            follow: self.follow.as_deref().map(parse_selector).transpose()?,
            detail: self.detail.as_ref().map(CompiledItem::compile).transpose()?,
            same_domain: self.same_domain,
            seed_kind: if self.item.is_none() && self.follow.is_none() {
                PageKind::Detail
            } else {
                PageKind::Listing
            },
            columns: self.columns(),
        })
    }

    /// Field names, item rule first, without duplicates.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for rule in self.item.iter().chain(self.detail.iter()) {
            for field in &rule.fields {
                if !columns.contains(&field.name) {
                    columns.push(field.name.clone());
                }
            }
        }
        columns
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScraperError::InvalidSelector(format!("{}: {}", css, e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Listing,
    Detail,
}

/// What one page yielded.
#[derive(Debug, Default)]
pub struct Extracted {
    pub records: Vec<Record>,
    pub next_pages: Vec<Url>,
    pub details: Vec<Url>,
}

#[derive(Debug)]
pub struct CompiledRecipe {
    pub name: String,
    item: Option<CompiledItem>,
    next_page: Option<Selector>,
    follow: Option<Selector>,
    detail: Option<CompiledItem>,
    pub same_domain: bool,
    seed_kind: PageKind,
    columns: Vec<String>,
}

impl CompiledRecipe {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// How start URLs are scraped: detail-only recipes treat them as
    /// detail pages.
    pub fn seed_kind(&self) -> PageKind {
        self.seed_kind
    }

    pub fn extract(&self, html: &str, page_url: &Url, kind: PageKind) -> Extracted {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut out = Extracted::default();

        match kind {
            PageKind::Listing => {
                if let Some(item) = &self.item {
                    out.records = item.records(root, page_url);
                }
                if let Some(next) = &self.next_page {
                    out.next_pages = links(root, next, page_url);
                }
                if let Some(follow) = &self.follow {
                    out.details = links(root, follow, page_url);
                }
            }
            PageKind::Detail => {
                if let Some(detail) = &self.detail {
                    out.records.push(detail.record(root, page_url));
                }
            }
        }

        log::debug!(
            "{}: {} record(s), {} next page(s), {} detail link(s)",
            page_url,
            out.records.len(),
            out.next_pages.len(),
            out.details.len()
        );
        out
    }
}

#[derive(Debug)]
struct CompiledItem {
    selector: Option<Selector>,
    fields: Vec<CompiledField>,
}

impl CompiledItem {
    fn compile(rule: &ItemRule) -> Result<Self> {
        Ok(Self {
            selector: rule.selector.as_deref().map(parse_selector).transpose()?,
            fields: rule
                .fields
                .iter()
                .map(CompiledField::compile)
                .collect::<Result<_>>()?,
        })
    }

    fn records(&self, root: ElementRef, page_url: &Url) -> Vec<Record> {
        match &self.selector {
            Some(sel) => root
                .select(sel)
                .map(|el| self.record(el, page_url))
                .collect(),
            None => vec![self.record(root, page_url)],
        }
    }

    fn record(&self, scope: ElementRef, page_url: &Url) -> Record {
        let mut record = Record::new(page_url.as_str());
        for field in &self.fields {
            record
                .fields
                .insert(field.name.clone(), field.value(scope, page_url));
        }
        record
    }
}

#[derive(Debug)]
struct CompiledField {
    name: String,
    selector: Option<Selector>,
    attr: Option<String>,
    all: bool,
    separator: String,
    pattern: Option<Regex>,
    url: bool,
}

impl CompiledField {
    fn compile(rule: &FieldRule) -> Result<Self> {
        Ok(Self {
            name: rule.name.clone(),
            selector: rule.selector.as_deref().map(parse_selector).transpose()?,
            attr: rule.attr.clone(),
            all: rule.all,
            separator: rule.separator.clone(),
            pattern: rule.pattern.as_deref().map(Regex::new).transpose()?,
            url: rule.url,
        })
    }

    fn value(&self, scope: ElementRef, page_url: &Url) -> Option<String> {
        let elements: Vec<ElementRef> = match &self.selector {
            Some(sel) => scope.select(sel).collect(),
            None => vec![scope],
        };

        let mut values = elements.into_iter().filter_map(|el| self.read(el, page_url));
        if self.all {
            let joined: Vec<String> = values.collect();
            (!joined.is_empty()).then(|| joined.join(&self.separator))
        } else {
            values.next()
        }
    }

    fn read(&self, el: ElementRef, page_url: &Url) -> Option<String> {
        let raw = match &self.attr {
            Some(attr) => el.value().attr(attr)?.trim().to_string(),
            None => element_text(el),
        };

        let value = if self.url {
            page_url.join(&raw).ok()?.to_string()
        } else {
            raw
        };

        let value = match &self.pattern {
            Some(re) => {
                let caps = re.captures(&value)?;
                caps.get(1).or_else(|| caps.get(0))?.as_str().to_string()
            }
            None => value,
        };

        (!value.is_empty()).then_some(value)
    }
}

fn element_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn links(root: ElementRef, selector: &Selector, page_url: &Url) -> Vec<Url> {
    root.select(selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let mut url = page_url.join(href).ok()?;
            url.set_fragment(None);
            Some(url)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <ol class="row">
            <li><article class="product_pod">
              <p class="star-rating Three"></p>
              <h3><a href="catalogue/a-light-in-the-attic_1000/index.html" title="A Light in the Attic">A Light in the ...</a></h3>
              <div class="product_price"><p class="price_color">£51.77</p>
                <p class="instock availability">
                    In stock
                </p></div>
            </article></li>
            <li><article class="product_pod">
              <p class="star-rating One"></p>
              <h3><a href="catalogue/tipping-the-velvet_999/index.html" title="Tipping the Velvet">Tipping the ...</a></h3>
              <div class="product_price"><p class="price_color">£53.74</p></div>
            </article></li>
          </ol>
          <ul class="pager"><li class="next"><a href="catalogue/page-2.html#top">next</a></li></ul>
        </body></html>
    "#;

    fn books() -> CompiledRecipe {
        Recipe::load("books").unwrap().compile().unwrap()
    }

    fn page() -> Url {
        Url::parse("https://books.toscrape.com/").unwrap()
    }

    #[test]
    fn builtin_recipes_compile() {
        for name in BUILTIN {
            Recipe::load(name).unwrap().compile().unwrap();
        }
    }

    #[test]
    fn listing_yields_one_record_per_item() {
        let out = books().extract(LISTING, &page(), PageKind::Listing);
        assert_eq!(out.records.len(), 2);

        let first = &out.records[0];
        assert_eq!(first.get("title"), Some("A Light in the Attic"));
        assert_eq!(first.get("price"), Some("£51.77"));
        assert_eq!(first.get("availability"), Some("In stock"));
        assert_eq!(first.get("rating"), Some("Three"));
        assert_eq!(
            first.get("url"),
            Some("https://books.toscrape.com/catalogue/a-light-in-the-attic_1000/index.html")
        );
        assert_eq!(first.source, "https://books.toscrape.com/");

        assert_eq!(out.records[1].get("availability"), None);
    }

    #[test]
    fn next_page_is_absolute_without_fragment() {
        let out = books().extract(LISTING, &page(), PageKind::Listing);
        assert_eq!(
            out.next_pages,
            [Url::parse("https://books.toscrape.com/catalogue/page-2.html").unwrap()]
        );
    }

    #[test]
    fn all_joins_every_match() {
        let html = r#"<div class="quote"><span class="text">“Be yourself.”</span>
            <small class="author">Oscar Wilde</small>
            <div class="tags"><a class="tag">attributed</a><a class="tag">honesty</a></div></div>"#;
        let recipe = Recipe::load("quotes").unwrap().compile().unwrap();
        let out = recipe.extract(html, &page(), PageKind::Listing);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].get("text"), Some("Be yourself."));
        assert_eq!(out.records[0].get("tags"), Some("attributed, honesty"));
    }

    #[test]
    fn detail_pages_use_the_detail_rule() {
        let recipe: Recipe = serde_json::from_str(
            r#"{
                "name": "detail",
                "follow": "h3 a",
                "detail": { "fields": [
                    { "name": "title", "selector": "h1" },
                    { "name": "upc", "selector": "table td" }
                ] }
            }"#,
        )
        .unwrap();
        let recipe = recipe.compile().unwrap();

        let listing = recipe.extract(LISTING, &page(), PageKind::Listing);
        assert!(listing.records.is_empty());
        assert_eq!(listing.details.len(), 2);

        let html = "<h1>Sharp Objects</h1><table><tr><td>e00eb4fd7b871a48</td></tr></table>";
        let detail = recipe.extract(html, &listing.details[0], PageKind::Detail);
        assert_eq!(detail.records.len(), 1);
        assert_eq!(detail.records[0].get("title"), Some("Sharp Objects"));
        assert_eq!(detail.records[0].get("upc"), Some("e00eb4fd7b871a48"));
    }

    #[test]
    fn invalid_selector_is_reported() {
        let recipe = Recipe::ad_hoc(Some("div[".into()), Vec::new(), None);
        assert!(matches!(recipe.compile(), Err(ScraperError::InvalidSelector(_))));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let mut field = FieldRule::from_shorthand("price=.price_color").unwrap();
        field.pattern = Some("(".into());
        let recipe = Recipe::ad_hoc(None, vec![field], None);
        assert!(matches!(recipe.compile(), Err(ScraperError::InvalidPattern(_))));
    }

    #[test]
    fn recipe_without_rules_is_rejected() {
        let recipe: Recipe = serde_json::from_str(r#"{ "name": "empty" }"#).unwrap();
        assert!(matches!(recipe.compile(), Err(ScraperError::Recipe(_))));
    }

    #[test]
    fn detail_only_recipe_seeds_detail_pages() {
        let recipe = Recipe::from_json(
            r#"{ "name": "single", "detail": { "fields": [ { "name": "title", "selector": "h1" } ] } }"#,
        )
        .unwrap();
        assert_eq!(recipe.compile().unwrap().seed_kind(), PageKind::Detail);
        assert_eq!(books().seed_kind(), PageKind::Listing);
    }

    #[test]
    fn unreachable_detail_rule_is_rejected() {
        let recipe = Recipe::from_json(
            r#"{
                "name": "stranded",
                "item": { "selector": "li", "fields": [ { "name": "a" } ] },
                "detail": { "fields": [ { "name": "b", "selector": "h1" } ] }
            }"#,
        )
        .unwrap();
        assert!(matches!(recipe.compile(), Err(ScraperError::Recipe(_))));
    }

    #[test]
    fn source_field_name_is_reserved() {
        let field = FieldRule::from_shorthand("source=.source-link").unwrap();
        let recipe = Recipe::ad_hoc(Some("div.quote".into()), vec![field], None);
        assert!(matches!(recipe.compile(), Err(ScraperError::Recipe(_))));

        let recipe = Recipe::from_json(
            r#"{ "name": "d", "detail": { "fields": [ { "name": "source", "selector": "cite" } ] } }"#,
        )
        .unwrap();
        assert!(matches!(recipe.compile(), Err(ScraperError::Recipe(_))));
    }

    #[test]
    fn field_shorthand() {
        let f = FieldRule::from_shorthand("link=h3 a@href").unwrap();
        assert_eq!(f.name, "link");
        assert_eq!(f.selector.as_deref(), Some("h3 a"));
        assert_eq!(f.attr.as_deref(), Some("href"));
        assert!(f.url);

        let f = FieldRule::from_shorthand("mail=a[href^='mailto:@x']").unwrap();
        assert_eq!(f.selector.as_deref(), Some("a[href^='mailto:@x']"));
        assert_eq!(f.attr, None);

        assert!(FieldRule::from_shorthand("no-equals").is_err());
        assert!(FieldRule::from_shorthand("=h1").is_err());
    }

    #[test]
    fn columns_are_unique_and_ordered() {
        let recipe: Recipe = serde_json::from_str(
            r#"{
                "name": "both",
                "item": { "selector": "li", "fields": [ { "name": "a" }, { "name": "b" } ] },
                "detail": { "fields": [ { "name": "b" }, { "name": "c" } ] }
            }"#,
        )
        .unwrap();
        assert_eq!(recipe.columns(), ["a", "b", "c"]);
    }
}
