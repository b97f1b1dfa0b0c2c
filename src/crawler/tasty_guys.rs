//! Adapter for the "맛있는 녀석들" (Tasty Guys) episode pages.
//!
//! Episode pages list the restaurants visited in free-form paragraphs. Two
//! layouts exist, selected by episode number:
//!
//! * v1 (episodes before [`V2_FROM_EPISODE`]): a marker line such as `▶ 상호명`
//!   or `1. 상호명`, followed by `- 주소 : ...` and `- 메뉴 : ...` lines.
//! * v2: keyed lines `상호 : ...`, `주소 : ...`, `메뉴 : ...`, often with a Kakao
//!   map link carrying the place id.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use html_scraper::{ElementRef, Html, Node, Selector};
use regex::Regex;
use tracing::debug;

use super::{CrawlError, EpisodeScraper, ScrapedEpisode, ScrapedRestaurant};

pub const CODE: &str = "TASTY_GUYS";

/// First episode published in the keyed (v2) layout.
pub const V2_FROM_EPISODE: i32 = 200;

static EPISODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*회").unwrap());
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})\s*[./-]\s*(\d{1,2})\s*[./-]\s*(\d{1,2})").unwrap());
static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[▶■●]|[①-⑳]|\d{1,2}\.)\s*(.*)$").unwrap());
static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-·•]?\s*주\s*소\s*[:：]\s*(.*)$").unwrap());
static MENU_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-·•]?\s*메\s*뉴\s*[:：]\s*(.*)$").unwrap());
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-·•]?\s*상\s*호(?:명)?\s*[:：]\s*(.*)$").unwrap());
static KAKAO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:place\.map\.kakao\.com/|map\.kakao\.com/\?itemId=)(\d+)").unwrap()
});

static HEADING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, .episode-title, .title, title").unwrap());
/// Content containers in priority order.
static CONTENT_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [".episode-content", ".view-content", "article", "#content", "body"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static PARAGRAPH_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "table", "section",
];

/// Layout version for an episode number.
pub fn parser_version(episode_no: i32) -> i16 {
    if episode_no < V2_FROM_EPISODE { 1 } else { 2 }
}

pub struct TastyGuysScraper {
    http: reqwest::Client,
    episode_url_template: String,
    list_url: String,
}

impl TastyGuysScraper {
    pub fn new(http: reqwest::Client, episode_url_template: &str, list_url: &str) -> Self {
        Self {
            http,
            episode_url_template: episode_url_template.to_string(),
            list_url: list_url.to_string(),
        }
    }

    pub fn episode_url(&self, episode_no: i32) -> String {
        self.episode_url_template
            .replace("{episode}", &episode_no.to_string())
    }

    async fn get_text(&self, url: &str) -> Result<String, CrawlError> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(20))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl EpisodeScraper for TastyGuysScraper {
    fn code(&self) -> &str {
        CODE
    }

    async fn latest_episode(&self) -> Result<i32, CrawlError> {
        let body = self.get_text(&self.list_url).await?;
        parse_latest_episode(&body)
            .ok_or_else(|| CrawlError::Parse("no episode numbers on list page".into()))
    }

    async fn fetch_episode(&self, episode_no: i32) -> Result<ScrapedEpisode, CrawlError> {
        let url = self.episode_url(episode_no);
        let body = self.get_text(&url).await?;
        let episode = parse_episode_page(&body, episode_no, &url)?;
        debug!(
            episode_no,
            parser_ver = episode.parser_ver,
            restaurants = episode.restaurants.len(),
            "parsed episode page"
        );
        Ok(episode)
    }
}

/// Highest `N회` number anywhere on the list page.
pub fn parse_latest_episode(html: &str) -> Option<i32> {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    EPISODE_RE
        .captures_iter(&text)
        .filter_map(|c| c[1].parse::<i32>().ok())
        .max()
}

/// Parse a full episode page. The episode number shown must match `requested`.
pub fn parse_episode_page(
    html: &str,
    requested: i32,
    source_url: &str,
) -> Result<ScrapedEpisode, CrawlError> {
    let document = Html::parse_document(html);

    let (found, title) = document
        .select(&HEADING_SEL)
        .find_map(|heading| {
            let text = collapse_whitespace(&heading.text().collect::<String>());
            let number = EPISODE_RE.captures(&text)?[1].parse::<i32>().ok()?;
            Some((number, text))
        })
        .ok_or_else(|| CrawlError::Parse("episode number not found in headings".into()))?;
    if found != requested {
        return Err(CrawlError::EpisodeMismatch { requested, found });
    }

    let content = CONTENT_SELS
        .iter()
        .find_map(|sel| document.select(sel).next())
        .unwrap_or_else(|| document.root_element());

    let body_text = content.text().collect::<Vec<_>>().join(" ");
    let air_date = parse_air_date(&body_text);

    let mut paragraphs: Vec<Vec<Token>> = content.select(&PARAGRAPH_SEL).map(tokenize).collect();
    if paragraphs.is_empty() {
        paragraphs.push(tokenize(content));
    }

    let parser_ver = parser_version(requested);
    let restaurants = match parser_ver {
        1 => parse_v1_blocks(&paragraphs),
        _ => parse_v2_blocks(&paragraphs),
    };

    Ok(ScrapedEpisode {
        episode_no: requested,
        title: Some(title),
        air_date,
        source_url: source_url.to_string(),
        parser_ver,
        restaurants,
    })
}

/// First `YYYY.MM.DD` style date (`.`, `-` or `/` separated).
pub fn parse_air_date(text: &str) -> Option<NaiveDate> {
    DATE_RE.captures_iter(text).find_map(|c| {
        NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
    })
}

/// Place id from a Kakao map URL or any text containing one.
pub fn kakao_place_id(text: &str) -> Option<String> {
    KAKAO_RE.captures(text).map(|c| c[1].to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Line(String),
    Link(String),
}

/// Flatten an element into text lines, breaking at `<br>` and block elements,
/// and surface link targets in document order.
fn tokenize(element: ElementRef<'_>) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    walk(element, &mut current, &mut tokens);
    flush_line(&mut current, &mut tokens);
    tokens
}

fn walk(element: ElementRef<'_>, current: &mut String, tokens: &mut Vec<Token>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => current.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if name == "br" {
                    flush_line(current, tokens);
                    continue;
                }
                if name == "a"
                    && let Some(href) = el.attr("href")
                {
                    tokens.push(Token::Link(href.to_string()));
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    flush_line(current, tokens);
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    walk(child_el, current, tokens);
                }
                if block {
                    flush_line(current, tokens);
                }
            }
            _ => {}
        }
    }
}

fn flush_line(current: &mut String, tokens: &mut Vec<Token>) {
    let line = collapse_whitespace(current);
    if !line.is_empty() {
        tokens.push(Token::Line(line));
    }
    current.clear();
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip decorative brackets and quotes around a restaurant name.
fn clean_name(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| "[]【】『』「」<>〈〉\"'“”‘’".contains(c))
        .trim()
        .to_string()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Default)]
struct Block {
    name: Option<String>,
    address: Option<String>,
    menu: Option<String>,
    kakao_place_id: Option<String>,
}

impl Block {
    fn finish(self) -> Option<ScrapedRestaurant> {
        let name = self.name.filter(|n| !n.is_empty())?;
        Some(ScrapedRestaurant {
            name,
            address: self.address.unwrap_or_default(),
            menu: self.menu,
            kakao_place_id: self.kakao_place_id,
        })
    }

    /// Apply an `주소`/`메뉴` line or a Kakao link. Returns whether the line was consumed.
    fn absorb_detail(&mut self, line: &str) -> bool {
        if let Some(c) = ADDRESS_RE.captures(line) {
            self.address = non_empty(&c[1]);
            if self.kakao_place_id.is_none() {
                self.kakao_place_id = kakao_place_id(line);
            }
            return true;
        }
        if let Some(c) = MENU_RE.captures(line) {
            self.menu = non_empty(&c[1]);
            return true;
        }
        if self.kakao_place_id.is_none()
            && let Some(id) = kakao_place_id(line)
        {
            self.kakao_place_id = Some(id);
            return true;
        }
        false
    }
}

fn push_block(block: Option<Block>, out: &mut Vec<ScrapedRestaurant>) {
    if let Some(restaurant) = block.and_then(Block::finish) {
        out.push(restaurant);
    }
}

/// v1: a marker line opens a block; the name follows the marker, or sits on
/// the next line when the marker stands alone.
fn parse_v1_blocks(paragraphs: &[Vec<Token>]) -> Vec<ScrapedRestaurant> {
    let mut out = Vec::new();
    for tokens in paragraphs {
        let mut block: Option<Block> = None;
        for token in tokens {
            match token {
                Token::Line(line) => {
                    if let Some(c) = MARKER_RE.captures(line) {
                        push_block(block.take(), &mut out);
                        let name = non_empty(&c[1]).map(|n| clean_name(&n));
                        block = Some(Block {
                            name,
                            ..Default::default()
                        });
                        continue;
                    }
                    let Some(current) = block.as_mut() else {
                        continue;
                    };
                    if current.absorb_detail(line) {
                        continue;
                    }
                    if current.name.is_none() {
                        current.name = Some(clean_name(line));
                    }
                }
                Token::Link(href) => {
                    if let Some(current) = block.as_mut()
                        && current.kakao_place_id.is_none()
                    {
                        current.kakao_place_id = kakao_place_id(href);
                    }
                }
            }
        }
        push_block(block, &mut out);
    }
    out
}

/// v2: a `상호 :` line opens a block; `주소`/`메뉴` lines and Kakao links fill it.
fn parse_v2_blocks(paragraphs: &[Vec<Token>]) -> Vec<ScrapedRestaurant> {
    let mut out = Vec::new();
    for tokens in paragraphs {
        let mut block: Option<Block> = None;
        for token in tokens {
            match token {
                Token::Line(line) => {
                    if let Some(c) = NAME_RE.captures(line) {
                        let name = non_empty(&c[1]).map(|n| clean_name(&n));
                        if block.as_ref().is_some_and(|b| b.name.is_some()) {
                            push_block(block.take(), &mut out);
                        }
                        // Details seen before the name line stay on the same block.
                        block.get_or_insert_with(Block::default).name = name;
                        continue;
                    }
                    let current = block.get_or_insert_with(Block::default);
                    current.absorb_detail(line);
                }
                Token::Link(href) => {
                    let current = block.get_or_insert_with(Block::default);
                    if current.kakao_place_id.is_none() {
                        current.kakao_place_id = kakao_place_id(href);
                    }
                }
            }
        }
        push_block(block, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(heading: &str, body: &str) -> String {
        format!(
            "<html><head><title>맛있는 녀석들</title></head><body>\
             <h2 class=\"episode-title\">{heading}</h2>\
             <div class=\"episode-content\">{body}</div></body></html>"
        )
    }

    #[test]
    fn test_parser_version_threshold() {
        assert_eq!(parser_version(1), 1);
        assert_eq!(parser_version(199), 1);
        assert_eq!(parser_version(200), 2);
        assert_eq!(parser_version(451), 2);
    }

    #[test]
    fn test_air_date_accepts_separators() {
        assert_eq!(
            parse_air_date("방송일 2019.03.08 (금)"),
            NaiveDate::from_ymd_opt(2019, 3, 8)
        );
        assert_eq!(
            parse_air_date("2021-11-26"),
            NaiveDate::from_ymd_opt(2021, 11, 26)
        );
        assert_eq!(parse_air_date("2020/1/3"), NaiveDate::from_ymd_opt(2020, 1, 3));
        assert_eq!(parse_air_date("2020.13.40 then 2020.02.01"), NaiveDate::from_ymd_opt(2020, 2, 1));
        assert_eq!(parse_air_date("no date"), None);
    }

    #[test]
    fn test_kakao_place_id_formats() {
        assert_eq!(
            kakao_place_id("https://place.map.kakao.com/12345678").as_deref(),
            Some("12345678")
        );
        assert_eq!(
            kakao_place_id("http://map.kakao.com/?itemId=987").as_deref(),
            Some("987")
        );
        assert_eq!(kakao_place_id("https://map.naver.com/123"), None);
    }

    #[test]
    fn test_latest_episode_takes_maximum() {
        let html = "<ul><li>451회 (2023.10.01)</li><li>452 회</li><li>99회</li></ul>";
        assert_eq!(parse_latest_episode(html), Some(452));
        assert_eq!(parse_latest_episode("<p>empty</p>"), None);
    }

    #[test]
    fn test_v1_marker_blocks() {
        let body = "<p>방송일 2018.05.04</p>\
            <p>▶ 을지면옥<br>- 주소 : 서울 중구 충무로14길 2-1<br>- 메뉴 : 물냉면</p>\
            <p>② [우래옥]<br>- 주소 : 서울 중구 창경궁로 62-29</p>\
            <p>3.<br>필동면옥<br>- 메뉴 : 비빔냉면</p>\
            <p>■<br>- 주소 : 어딘가</p>";
        let episode = parse_episode_page(&page("172회 냉면 특집", body), 172, "https://x/172").unwrap();

        assert_eq!(episode.parser_ver, 1);
        assert_eq!(episode.air_date, NaiveDate::from_ymd_opt(2018, 5, 4));
        assert_eq!(episode.title.as_deref(), Some("172회 냉면 특집"));
        let names: Vec<_> = episode.restaurants.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["을지면옥", "우래옥", "필동면옥"]);
        assert_eq!(episode.restaurants[0].address, "서울 중구 충무로14길 2-1");
        assert_eq!(episode.restaurants[0].menu.as_deref(), Some("물냉면"));
        // no address line keeps the block with an empty address
        assert_eq!(episode.restaurants[2].address, "");
    }

    #[test]
    fn test_v1_multiple_markers_in_one_paragraph() {
        let body = "<p>① 가게A<br>- 주소 : 부산 중구<br>② 가게B<br>- 주소 : 부산 서구</p>";
        let episode = parse_episode_page(&page("12회", body), 12, "u").unwrap();
        assert_eq!(episode.restaurants.len(), 2);
        assert_eq!(episode.restaurants[1].name, "가게B");
        assert_eq!(episode.restaurants[1].address, "부산 서구");
    }

    #[test]
    fn test_v2_keyed_blocks_with_kakao_links() {
        let body = "<p>상호 : 할매순대국<br>주소 ： 서울 마포구 연남로 1<br>메뉴 : 순대국\
                    <br><a href=\"https://place.map.kakao.com/11111\">지도</a></p>\
                    <p>상호 : 돼지굴비집<br>주소 : 서울 강남구 테헤란로 5<br>\
                    지도 http://map.kakao.com/?itemId=22222</p>\
                    <p>주소 : 이름 없는 곳</p>";
        let episode = parse_episode_page(&page("제 300 회", body), 300, "u").unwrap();

        assert_eq!(episode.parser_ver, 2);
        assert_eq!(episode.restaurants.len(), 2);
        assert_eq!(episode.restaurants[0].name, "할매순대국");
        assert_eq!(episode.restaurants[0].address, "서울 마포구 연남로 1");
        assert_eq!(episode.restaurants[0].menu.as_deref(), Some("순대국"));
        assert_eq!(episode.restaurants[0].kakao_place_id.as_deref(), Some("11111"));
        assert_eq!(episode.restaurants[1].kakao_place_id.as_deref(), Some("22222"));
        assert_eq!(episode.restaurants[1].menu, None);
    }

    #[test]
    fn test_v2_details_before_name_line() {
        let body = "<p>주소 : 서울 마포구 연남로 1<br>상호 : 할매순대국<br>메뉴 : 순대국\
                    <br>상호 : 연남꼬치<br>주소 : 서울 마포구 연남로 2</p>";
        let episode = parse_episode_page(&page("300회", body), 300, "u").unwrap();

        assert_eq!(episode.restaurants.len(), 2);
        assert_eq!(episode.restaurants[0].name, "할매순대국");
        assert_eq!(episode.restaurants[0].address, "서울 마포구 연남로 1");
        assert_eq!(episode.restaurants[0].menu.as_deref(), Some("순대국"));
        assert_eq!(episode.restaurants[1].name, "연남꼬치");
        assert_eq!(episode.restaurants[1].address, "서울 마포구 연남로 2");
    }

    #[test]
    fn test_episode_mismatch_is_error() {
        let err = parse_episode_page(&page("201회", "<p>상호 : A</p>"), 202, "u").unwrap_err();
        assert!(matches!(
            err,
            CrawlError::EpisodeMismatch {
                requested: 202,
                found: 201
            }
        ));
    }

    #[test]
    fn test_missing_episode_number_is_parse_error() {
        let html = "<html><head><title>맛있는 녀석들</title></head><body><p>상호 : A</p></body></html>";
        assert!(matches!(
            parse_episode_page(html, 5, "u"),
            Err(CrawlError::Parse(_))
        ));
    }

    #[test]
    fn test_episode_url_substitutes_number() {
        let scraper = TastyGuysScraper::new(
            reqwest::Client::new(),
            "https://example.com/ep/{episode}",
            "https://example.com/ep",
        );
        assert_eq!(scraper.episode_url(42), "https://example.com/ep/42");
    }
}
