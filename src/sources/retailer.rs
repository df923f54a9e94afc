use super::{SourceAdapter, SourceDescriptor, SourceError};
use crate::{
    config::{ConfigError, HtmlRetailerConfig},
    scrape::{
        extract::{self, element_text, parse_selector},
        Accept, NetworkClient,
    },
    types::{BookRequest, Candidate},
};
use scraper::{Html, Selector};

/// Images kept from a single product page
const IMAGES_PER_PAGE: usize = 3;

/// Marketplace and bookstore sites scraped through their search page
pub struct HtmlRetailer {
    descriptor: SourceDescriptor,
    config: HtmlRetailerConfig,
    item: Selector,
    title: Selector,
    author: Option<Selector>,
    link: Option<Selector>,
    listing_image: Option<Selector>,
    image_selectors: Vec<Selector>,
}

/// A listing entry that passed the match filter
#[derive(Debug, Clone, PartialEq)]
struct ListingMatch {
    relevance: f32,
    link: Option<String>,
    image: Option<String>,
}

impl HtmlRetailer {
    pub fn new(descriptor: SourceDescriptor, config: HtmlRetailerConfig) -> Result<Self, ConfigError> {
        let parse = |s: &str| parse_selector(s).map_err(|e| ConfigError::source(&descriptor.name, e));
        let parse_opt = |s: &Option<String>| s.as_deref().map(parse).transpose();

        Ok(Self {
            item: parse(&config.item_selector)?,
            title: parse(&config.title_selector)?,
            author: parse_opt(&config.author_selector)?,
            link: parse_opt(&config.link_selector)?,
            listing_image: parse_opt(&config.listing_image_selector)?,
            image_selectors: config
                .image_selectors
                .iter()
                .map(|s| parse(s))
                .collect::<Result<Vec<_>, _>>()?,
            config,
            descriptor,
        })
    }

    pub fn search_url(&self, book: &BookRequest) -> String {
        let query = url::form_urlencoded::byte_serialize(book.query().as_bytes()).collect::<String>();
        let path = self.config.search_url.replace("{query}", &query);

        if path.starts_with("http://") || path.starts_with("https://") {
            path
        } else {
            format!("{}/{}", self.descriptor.base_url, path.trim_start_matches('/'))
        }
    }

    fn parse_listing(&self, html: &str, page_url: &str, book: &BookRequest) -> Vec<ListingMatch> {
        let document = Html::parse_document(html);
        let mut matches = vec![];

        for item in document.select(&self.item) {
            let title = item
                .select(&self.title)
                .next()
                .map(element_text)
                .unwrap_or_default();
            if title.is_empty() {
                continue;
            }

            let author = self
                .author
                .as_ref()
                .and_then(|sel| item.select(sel).next())
                .map(element_text);

            let score = self.descriptor.score(book, &title, author.as_deref());
            if !score.accepted {
                log::debug!(
                    "source={} rejected listing {title:?} by {author:?} (title={:.2})",
                    self.descriptor.name,
                    score.title
                );
                continue;
            }

            let link = self
                .link
                .as_ref()
                .and_then(|sel| item.select(sel).next())
                .and_then(|el| el.attr("href"))
                .and_then(|href| extract::resolve_url(href, page_url));

            let image = self
                .listing_image
                .as_ref()
                .and_then(|sel| item.select(sel).next())
                .and_then(extract::image_from_element)
                .and_then(|src| extract::resolve_url(&src, page_url));

            matches.push(ListingMatch {
                relevance: score.relevance(),
                link,
                image,
            });

            if matches.len() >= self.config.max_results {
                break;
            }
        }

        // stable: equal scores keep listing order
        matches.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        matches
    }

    fn page_images(&self, html: &str, page_url: &str) -> Vec<String> {
        extract::find_images(
            html,
            page_url,
            &self.config.extraction,
            &self.image_selectors,
            &self.config.markup_hints,
        )
    }
}

impl SourceAdapter for HtmlRetailer {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn search(&self, book: &BookRequest, net: &NetworkClient) -> Result<Vec<Candidate>, SourceError> {
        let search_url = self.search_url(book);
        let resp = self.descriptor.fetch(net, &search_url, Accept::Html)?;
        let listing = self.parse_listing(&resp.text(), &resp.url, book);

        let mut candidates: Vec<Candidate> = vec![];
        let push = |candidates: &mut Vec<Candidate>, url: &str, relevance: f32| {
            let candidate = self.descriptor.candidate(url, relevance);
            if !candidates.iter().any(|c| c.url == candidate.url) {
                candidates.push(candidate);
            }
        };

        for entry in listing {
            let mut from_page = vec![];
            if let (true, Some(link)) = (self.config.follow_product_page, &entry.link) {
                match self.descriptor.fetch(net, link, Accept::Html) {
                    Ok(page) => {
                        from_page = self.page_images(&page.text(), &page.url);
                        from_page.truncate(IMAGES_PER_PAGE);
                    }
                    Err(e) => log::debug!(
                        "source={} product page {link} failed: {e}",
                        self.descriptor.name
                    ),
                }
            }

            for url in &from_page {
                push(&mut candidates, url, entry.relevance);
            }
            if let Some(image) = &entry.image {
                push(&mut candidates, image, entry.relevance);
            }
        }

        Ok(candidates)
    }

    fn extract_from_link(
        &self,
        link: &str,
        _book: &BookRequest,
        net: &NetworkClient,
    ) -> Result<Vec<Candidate>, SourceError> {
        let page = self.descriptor.fetch(net, link, Accept::Html)?;

        let mut candidates: Vec<Candidate> = vec![];
        for url in self.page_images(&page.text(), &page.url) {
            let candidate = self.descriptor.candidate(&url, 1.0);
            if !candidates.iter().any(|c| c.url == candidate.url) {
                candidates.push(candidate);
            }
        }

        Ok(candidates)
    }
}
