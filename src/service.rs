//! Service endpoint description and request preparation.

// crates.io
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{ApiRequest, PreparedCall},
	session::Secret,
};

/// Describes the remote marketplace service a client talks to.
///
/// Use [`ServiceDescriptor::builder`] to construct one; the builder validates the refresh
/// path against the base URL so misconfiguration surfaces before any traffic is sent.
/// Paths beginning with `/` resolve from the host root, so a base URL carrying a path
/// prefix should keep a trailing slash.
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
	/// Base URL every request path resolves against.
	pub base_url: Url,
	/// Service-relative path of the credential refresh exchange.
	pub refresh_path: String,
	/// Authorization scheme prefixed to the access credential.
	pub auth_scheme: String,
}
impl ServiceDescriptor {
	/// Default service-relative refresh exchange path.
	pub const DEFAULT_REFRESH_PATH: &'static str = "/auth/refresh";
	/// Default authorization scheme.
	pub const DEFAULT_AUTH_SCHEME: &'static str = "Bearer";

	/// Returns a builder for the provided base URL.
	pub fn builder(base_url: Url) -> ServiceDescriptorBuilder {
		ServiceDescriptorBuilder {
			base_url,
			refresh_path: Self::DEFAULT_REFRESH_PATH.into(),
			auth_scheme: Self::DEFAULT_AUTH_SCHEME.into(),
		}
	}

	/// Resolves a service-relative path into an absolute URL.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		self.base_url
			.join(path)
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
	}

	/// Prepares one dispatch: resolves the URL, encodes the body, and attaches the
	/// authorization header when an access credential is supplied.
	pub fn prepare(
		&self,
		request: &ApiRequest,
		access: Option<&Secret>,
	) -> Result<PreparedCall, ConfigError> {
		let url = self.resolve(&request.path)?;
		let mut headers = request.headers.clone();
		let body = request
			.body
			.as_ref()
			.map(|value| {
				serde_json::to_vec(value).map_err(|source| ConfigError::BodySerialize { source })
			})
			.transpose()?;

		if body.is_some() {
			headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		}
		if let Some(secret) = access {
			headers.insert(AUTHORIZATION, self.authorization_value(secret)?);
		}

		Ok(PreparedCall { method: request.method.clone(), url, headers, body })
	}

	fn authorization_value(&self, secret: &Secret) -> Result<HeaderValue, ConfigError> {
		let mut value =
			HeaderValue::from_str(&format!("{} {}", self.auth_scheme, secret.expose()))
				.map_err(|source| ConfigError::InvalidAuthorization { source })?;

		value.set_sensitive(true);

		Ok(value)
	}
}

/// Builder for [`ServiceDescriptor`].
#[derive(Clone, Debug)]
pub struct ServiceDescriptorBuilder {
	base_url: Url,
	refresh_path: String,
	auth_scheme: String,
}
impl ServiceDescriptorBuilder {
	/// Overrides the refresh exchange path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the authorization scheme (defaults to `Bearer`).
	pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.auth_scheme = scheme.into();

		self
	}

	/// Validates the configuration and produces a [`ServiceDescriptor`].
	pub fn build(self) -> Result<ServiceDescriptor, ConfigError> {
		let descriptor = ServiceDescriptor {
			base_url: self.base_url,
			refresh_path: self.refresh_path,
			auth_scheme: self.auth_scheme,
		};

		descriptor.resolve(&descriptor.refresh_path).map_err(|source| match source {
			ConfigError::InvalidPath { source, .. } => ConfigError::InvalidBaseUrl { source },
			other => other,
		})?;

		Ok(descriptor)
	}
}
