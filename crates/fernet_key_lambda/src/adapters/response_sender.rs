/// Delivers the response document to the pre-signed `ResponseURL`.
pub trait ResponseSender {
    fn send_response(&self, response_url: &str, body: &[u8]) -> Result<(), String>;
}

impl<F> ResponseSender for F
where
    F: Fn(&str, &[u8]) -> Result<(), String>,
{
    fn send_response(&self, response_url: &str, body: &[u8]) -> Result<(), String> {
        self(response_url, body)
    }
}
