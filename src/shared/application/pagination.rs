/// Pagination support for queries
///
/// Page numbers are 0-based. A `Page` carries the total row count; a `Slice`
/// only knows whether another page exists.
use serde::{Deserialize, Serialize};

use crate::shared::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(AppError::InvalidInput(format!(
                "Invalid sort direction: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(property: &str) -> Self {
        Self {
            property: property.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: &str) -> Self {
        Self {
            property: property.to_string(),
            direction: Direction::Desc,
        }
    }
}

/// Ordered list of sort keys; empty means unsorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(order: Order) -> Self {
        Self {
            orders: vec![order],
        }
    }

    pub fn asc(property: &str) -> Self {
        Self::by(Order::asc(property))
    }

    pub fn desc(property: &str) -> Self {
        Self::by(Order::desc(property))
    }

    pub fn and(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }

    /// Parse request-style sort parameters such as `"username,desc"` or `"age"`.
    pub fn parse(params: &[&str]) -> AppResult<Self> {
        let mut sort = Sort::unsorted();
        for param in params {
            let mut parts = param.split(',').map(str::trim).filter(|p| !p.is_empty());
            let property = match parts.next() {
                Some(property) => property,
                None => continue,
            };
            let direction = match parts.next() {
                Some(direction) => direction.parse()?,
                None => Direction::Asc,
            };
            sort = sort.and(Order {
                property: property.to_string(),
                direction,
            });
        }
        Ok(sort)
    }
}

/// Page request: 0-based page number, page size and sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PageRequestFields")]
pub struct PageRequest {
    number: u32,
    size: u32,
    sort: Sort,
}

/// Wire form of `PageRequest`, validated through `PageRequest::sorted`.
#[derive(Deserialize)]
struct PageRequestFields {
    number: u32,
    size: u32,
    sort: Sort,
}

impl TryFrom<PageRequestFields> for PageRequest {
    type Error = AppError;

    fn try_from(fields: PageRequestFields) -> AppResult<Self> {
        Self::sorted(fields.number, fields.size, fields.sort)
    }
}

impl PageRequest {
    pub fn of(number: u32, size: u32) -> AppResult<Self> {
        Self::sorted(number, size, Sort::unsorted())
    }

    pub fn sorted(number: u32, size: u32, sort: Sort) -> AppResult<Self> {
        if size == 0 {
            return Err(AppError::InvalidInput(
                "Page size must not be less than one".to_string(),
            ));
        }
        Ok(Self { number, size, sort })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Calculate offset for database queries
    pub fn offset(&self) -> u64 {
        self.number as u64 * self.size as u64
    }

    pub fn next(&self) -> Self {
        Self {
            number: self.number.saturating_add(1),
            size: self.size,
            sort: self.sort.clone(),
        }
    }

    pub fn previous_or_first(&self) -> Self {
        Self {
            number: self.number.saturating_sub(1),
            size: self.size,
            sort: self.sort.clone(),
        }
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    /// Total row count, skipping the count query when the content already proves it.
    ///
    /// A first page shorter than the page size holds every row; a later
    /// non-empty page shorter than the page size is the last one.
    pub fn resolve_total(
        &self,
        content_len: usize,
        count: impl FnOnce() -> AppResult<u64>,
    ) -> AppResult<u64> {
        let content_len = content_len as u64;
        let size = self.size as u64;
        if self.offset() == 0 {
            if size > content_len {
                return Ok(content_len);
            }
            return count();
        }
        if content_len != 0 && size > content_len {
            return Ok(self.offset() + content_len);
        }
        count()
    }
}

/// One page of results with the total row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub first: bool,
    pub last: bool,
    pub has_next: bool,
    pub has_previous: bool,
    pub number_of_elements: usize,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        let size = request.size as u64;
        let total_pages = total_elements.div_ceil(size) as u32;
        let has_next = (request.number as u64 + 1) * size < total_elements;
        let number_of_elements = content.len();

        Self {
            content,
            number: request.number,
            size: request.size,
            total_elements,
            total_pages,
            first: request.number == 0,
            last: !has_next,
            has_next,
            has_previous: request.number > 0,
            number_of_elements,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            first: self.first,
            last: self.last,
            has_next: self.has_next,
            has_previous: self.has_previous,
            number_of_elements: self.number_of_elements,
        }
    }

    pub fn try_map<U>(self, f: impl FnMut(T) -> AppResult<U>) -> AppResult<Page<U>> {
        let content = self.content.into_iter().map(f).collect::<AppResult<Vec<U>>>()?;
        Ok(Page {
            content,
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            first: self.first,
            last: self.last,
            has_next: self.has_next,
            has_previous: self.has_previous,
            number_of_elements: self.number_of_elements,
        })
    }
}

/// One page of results without a total count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slice<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub first: bool,
    pub last: bool,
    pub has_next: bool,
    pub has_previous: bool,
    pub number_of_elements: usize,
}

impl<T> Slice<T> {
    /// Build from a query that fetched `size + 1` rows; the extra row only signals `has_next`.
    pub fn from_overfetch(mut rows: Vec<T>, request: &PageRequest) -> Self {
        let has_next = rows.len() > request.size as usize;
        rows.truncate(request.size as usize);
        let number_of_elements = rows.len();

        Self {
            content: rows,
            number: request.number,
            size: request.size,
            first: request.number == 0,
            last: !has_next,
            has_next,
            has_previous: request.number > 0,
            number_of_elements,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            first: self.first,
            last: self.last,
            has_next: self.has_next,
            has_previous: self.has_previous,
            number_of_elements: self.number_of_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_metadata_for_five_rows_in_pages_of_three() {
        let request = PageRequest::of(0, 3).unwrap();
        let page = Page::new(vec![5, 4, 3], &request, 5);

        assert_eq!(page.total_pages, 2);
        assert!(page.first);
        assert!(page.has_next);
        assert!(!page.last);

        let second = Page::new(vec![2, 1], &request.next(), 5);
        assert!(!second.has_next);
        assert!(second.last);
        assert!(second.has_previous);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let page: Page<i32> = Page::new(vec![], &PageRequest::of(0, 10).unwrap(), 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.first);
        assert!(page.last);
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(PageRequest::of(0, 0).is_err());
    }

    #[test]
    fn deserialized_requests_are_validated() {
        let zero = serde_json::from_str::<PageRequest>(r#"{"number":0,"size":0,"sort":{"orders":[]}}"#);
        assert!(zero.is_err());

        let request: PageRequest =
            serde_json::from_str(r#"{"number":2,"size":5,"sort":{"orders":[]}}"#).unwrap();
        assert_eq!(request, PageRequest::of(2, 5).unwrap());
        assert_eq!(serde_json::to_value(&request).unwrap()["size"], 5);
    }

    #[test]
    fn next_saturates_at_the_last_page_number() {
        let request = PageRequest::of(u32::MAX, 1).unwrap();
        assert_eq!(request.next().number(), u32::MAX);
        assert_eq!(PageRequest::of(3, 1).unwrap().next().number(), 4);
    }

    #[test]
    fn count_is_elided_for_short_pages() {
        let first = PageRequest::of(0, 10).unwrap();
        assert_eq!(first.resolve_total(4, || panic!("count ran")).unwrap(), 4);

        let third = PageRequest::of(2, 10).unwrap();
        assert_eq!(third.resolve_total(3, || panic!("count ran")).unwrap(), 23);

        // Full or empty pages need the count
        assert_eq!(first.resolve_total(10, || Ok(42)).unwrap(), 42);
        assert_eq!(third.resolve_total(0, || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn slice_drops_the_extra_row() {
        let request = PageRequest::of(0, 3).unwrap();
        let slice = Slice::from_overfetch(vec![1, 2, 3, 4], &request);
        assert_eq!(slice.content, vec![1, 2, 3]);
        assert!(slice.has_next);

        let tail = Slice::from_overfetch(vec![1, 2], &request.next());
        assert!(!tail.has_next);
        assert!(tail.has_previous);
    }

    #[test]
    fn sort_parameters_parse() {
        let sort = Sort::parse(&["username,desc", "age"]).unwrap();
        assert_eq!(
            sort.orders(),
            &[Order::desc("username"), Order::asc("age")]
        );
        assert!(Sort::parse(&["username,sideways"]).is_err());
    }

    #[test]
    fn page_serializes_camel_case() {
        let page = Page::new(vec!["a"], &PageRequest::of(0, 5).unwrap(), 1);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalElements"], 1);
        assert_eq!(json["hasNext"], false);
        assert_eq!(json["numberOfElements"], 1);
    }
}
