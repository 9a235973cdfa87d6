use http::{
    header::{CONTENT_LENGTH, DATE},
    HeaderValue,
};

use crate::Response;

pub type BoxLayer<T> = Box<dyn 'static + Layer<T> + Send + Sync>;

/// A trait finalizing `Response`s before the transport writes them.
pub trait Layer<I> {
    fn execute(&self, data: &mut I);
}

/// A collection of `Layers` to be executed in sequence.
pub struct LayerGroup<I> {
    layers: Vec<BoxLayer<I>>,
}

impl<I> LayerGroup<I> {
    pub fn new() -> Self {
        LayerGroup { layers: Vec::new() }
    }

    /// Pushes a new `Layer` to the stack
    pub fn add_layer(mut self, layer: impl 'static + Layer<I> + Send + Sync) -> Self {
        self.layers.push(Box::new(layer));

        self
    }
}

impl<I> Default for LayerGroup<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Layer<I> for LayerGroup<I> {
    fn execute(&self, data: &mut I) {
        for layer in &self.layers {
            layer.execute(data)
        }
    }
}

/// Layers applied to every response the server writes.
pub struct DefaultResponseGroup;

impl DefaultResponseGroup {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> LayerGroup<Response> {
        let group = LayerGroup::new().add_layer(SetContentLength);

        #[cfg(feature = "date")]
        let group = group.add_layer(SetDate);

        group
    }
}

/// Sets the content length header of all outgoing responses that may be missing it.
pub struct SetContentLength;

impl Layer<Response> for SetContentLength {
    fn execute(&self, data: &mut Response) {
        if data.headers().contains_key(CONTENT_LENGTH) {
            return;
        }

        let len = HeaderValue::from(data.body().len());

        data.headers_mut().insert(CONTENT_LENGTH, len);
    }
}

/// Sets the date header of all outgoing responses
#[cfg(feature = "date")]
pub struct SetDate;

#[cfg(feature = "date")]
impl Layer<Response> for SetDate {
    fn execute(&self, data: &mut Response) {
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();

        if let Ok(value) = HeaderValue::from_str(&date) {
            data.headers_mut().insert(DATE, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_is_set_once() {
        let mut response = Response::new(b"hello".to_vec());

        DefaultResponseGroup::new().execute(&mut response);

        assert_eq!(response.headers()[CONTENT_LENGTH], "5");

        response
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from_static("3"));

        SetContentLength.execute(&mut response);

        assert_eq!(response.headers()[CONTENT_LENGTH], "3");
    }

    #[cfg(feature = "date")]
    #[test]
    fn date_is_http_date() {
        let mut response = Response::new(Vec::new());

        SetDate.execute(&mut response);

        let date = response.headers()[DATE].to_str().unwrap();

        assert!(date.ends_with(" GMT"));
        assert_eq!(date.len(), "Sun, 06 Nov 1994 08:49:37 GMT".len());
    }
}
