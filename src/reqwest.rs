use std::{fmt::Debug, time::Duration};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::serde::SerdeResponseParseAsync;

#[derive(Debug)]
pub enum ReqwestStage {
    Send,
    Status,
    DecodeText,
    Deserialise,
}

fn parse_url<U: ToString>(url: U) -> crate::Result<Url> {
    url.to_string()
        .parse::<Url>()
        .map_err(|_| crate::Error::InvalidUrl(url.to_string()))
}

#[derive(Debug)]
#[allow(dead_code)]
pub struct ReqwestErrorContext {
    pub url: Url,
    query: String,
}

#[derive(Debug)]
pub enum ReqwestInnerError {
    /// Stored without its URL, the full URL may carry an API key.
    Reqwest(reqwest::Error),
    SerdePath(crate::serde::SerdePathError),
}

impl ReqwestInnerError {
    /// 429 and 5xx responses are worth retrying, other statuses are not.
    pub fn is_transient_status(&self) -> bool {
        match self {
            Self::Reqwest(err) => err.status().is_some_and(|status| {
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }),
            Self::SerdePath(_) => false,
        }
    }
}

pub struct Reqwest {
    builder: RequestBuilder,
    timeout: Option<Duration>,
    error_context: Option<ReqwestErrorContext>,
}

impl Reqwest {
    pub fn get<U: ToString>(client: &Client, url: U) -> crate::Result<Self> {
        let url = parse_url(url)?;
        let builder = client.get(url.clone());
        Ok(Self {
            builder,
            timeout: None,
            error_context: Some(ReqwestErrorContext {
                url,
                query: String::new(),
            }),
        })
    }

    /// Adds query parameters which are also recorded in the error context.
    pub fn query<T: serde::Serialize + Debug>(mut self, query: &T) -> Self {
        self.builder = self.builder.query(query);
        if let Some(context) = self.error_context.as_mut() {
            context.query.push_str(&format!("{query:?}"));
        }
        self
    }

    /// Adds a query parameter that never shows up in error messages, e.g. an API key.
    pub fn secret_query(mut self, key: &str, value: &str) -> Self {
        self.builder = self.builder.query(&[(key, value)]);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.timeout(timeout);
        self.timeout = Some(timeout);
        self
    }

    async fn receive_text_internal(mut self) -> crate::Result<(String, Box<ReqwestErrorContext>)> {
        let error_context = Box::new(
            self.error_context
                .take()
                .ok_or(crate::Error::ReqwestErrorContextMissing)?,
        );

        let send_result = self.builder.send().await;
        let Ok(response) = send_result else {
            let err = send_result.unwrap_err();
            if err.is_connect() {
                return Err(crate::Error::Internet(error_context.url));
            }
            if let (true, Some(timeout)) = (err.is_timeout(), self.timeout) {
                return Err(crate::Error::Timeout(timeout));
            }
            return Err(crate::Error::ReqwestFailed {
                stage: ReqwestStage::Send,
                context: error_context,
                inner: ReqwestInnerError::Reqwest(err.without_url()),
            });
        };

        let status_result = response.error_for_status();
        let Ok(response) = status_result else {
            let err = status_result.unwrap_err();
            return Err(crate::Error::ReqwestFailed {
                stage: ReqwestStage::Status,
                context: error_context,
                inner: ReqwestInnerError::Reqwest(err.without_url()),
            });
        };

        let text_result = response.text().await;
        let Ok(text) = text_result else {
            let err = text_result.unwrap_err();
            return Err(crate::Error::ReqwestFailed {
                stage: ReqwestStage::DecodeText,
                context: error_context,
                inner: ReqwestInnerError::Reqwest(err.without_url()),
            });
        };

        Ok((text, error_context))
    }

    pub async fn receive_json<J: Debug + DeserializeOwned>(self) -> crate::Result<J> {
        let (text, error_context) = self.receive_text_internal().await?;

        let parse_result = text.as_str().serde_parse_custom().await;
        let Ok(json) = parse_result else {
            let err = parse_result.unwrap_err();
            return Err(crate::Error::ReqwestFailed {
                stage: ReqwestStage::Deserialise,
                context: error_context,
                inner: ReqwestInnerError::SerdePath(err),
            });
        };
        Ok(json)
    }
}
