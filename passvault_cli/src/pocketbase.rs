//! PassVault CLI - PocketBase record store
//!
//! Blocking JSON-over-HTTP client for a PocketBase server holding the
//! `credentials` and `vault_config` collections. The server only ever sees
//! ciphertext tokens.

use std::time::Duration;

use parking_lot::RwLock;
use passvault_core::{Credential, RecordStore, VaultConfig, VaultError, VaultResult};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operator login endpoints, newest server versions first
const AUTH_ENDPOINTS: [&str; 3] = [
    "/api/collections/_superusers/auth-with-password",
    "/api/collections/users/auth-with-password",
    "/api/admins/auth-with-password",
];

const CREDENTIALS: &str = "/api/collections/credentials/records";
const VAULT_CONFIG: &str = "/api/collections/vault_config/records";
const PAGE_SIZE: &str = "500";

#[derive(Serialize)]
struct AuthRequest<'a> {
    identity: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    items: Vec<T>,
    #[serde(default = "single_page")]
    total_pages: u32,
}

fn single_page() -> u32 {
    1
}

/// PocketBase-backed [`RecordStore`]
pub struct PocketBaseStore {
    base_url: String,
    http: Client,
    token: RwLock<Option<SecretString>>,
}

impl PocketBaseStore {
    pub fn new(base_url: &str) -> VaultResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VaultError::Connectivity(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn url_with_query(&self, path: &str, params: &[(&str, &str)]) -> VaultResult<Url> {
        Url::parse_with_params(&self.url(path), params)
            .map_err(|e| VaultError::Store(format!("invalid store URL: {}", e)))
    }

    fn request(&self, method: Method, url: impl reqwest::IntoUrl) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match self.token.read().as_ref() {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    fn send(&self, builder: RequestBuilder, what: &str) -> VaultResult<Response> {
        debug!(request = what, "store request");
        let response = builder
            .send()
            .map_err(|e| VaultError::Connectivity(format!("{}: {}", what, e)))?;
        check_status(response, what)
    }
}

impl RecordStore for PocketBaseStore {
    fn health(&self) -> VaultResult<()> {
        let response = self
            .http
            .get(self.url("/api/health"))
            .send()
            .map_err(|e| VaultError::Connectivity(format!("cannot reach record store: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(VaultError::Connectivity(format!(
                "health check failed: status {}",
                response.status().as_u16()
            )))
        }
    }

    fn authenticate_operator(
        &self,
        identity: &str,
        secret: &SecretString,
    ) -> VaultResult<SecretString> {
        let body = AuthRequest {
            identity,
            password: secret.expose_secret(),
        };

        let mut reached = false;
        let mut last_error = String::from("no endpoint tried");

        for endpoint in AUTH_ENDPOINTS {
            let response = match self.http.post(self.url(endpoint)).json(&body).send() {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("{}: {}", endpoint, e);
                    continue;
                }
            };
            reached = true;

            let status = response.status();
            if status == StatusCode::OK {
                match response.json::<AuthResponse>() {
                    Ok(auth) => {
                        info!(endpoint, "operator authenticated");
                        *self.token.write() = Some(SecretString::from(auth.token.clone()));
                        return Ok(SecretString::from(auth.token));
                    }
                    Err(e) => {
                        last_error = format!("{}: unreadable auth response: {}", endpoint, e);
                        continue;
                    }
                }
            }

            let text = response.text().unwrap_or_default();
            last_error = format!("{} failed with {}: {}", endpoint, status.as_u16(), text.trim());
            debug!(endpoint, status = status.as_u16(), "auth endpoint rejected");
        }

        if reached {
            Err(VaultError::OperatorAuthFailed(last_error))
        } else {
            Err(VaultError::Connectivity(last_error))
        }
    }

    fn create_credential(&self, record: &Credential) -> VaultResult<Credential> {
        let response = self.send(
            self.request(Method::POST, self.url(CREDENTIALS)).json(record),
            "create credential",
        )?;
        read_json(response)
    }

    fn get_credential(&self, id: &str) -> VaultResult<Credential> {
        let url = self.url(&format!("{}/{}", CREDENTIALS, id));
        let response = self.send(self.request(Method::GET, url), "get credential")?;
        read_json(response)
    }

    fn list_credentials(&self, search: Option<&str>) -> VaultResult<Vec<Credential>> {
        let filter = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(search_filter);

        // Rotation rewrites whatever this returns, so every page is fetched.
        let mut records = Vec::new();
        let mut page: u32 = 1;
        loop {
            let page_param = page.to_string();
            let mut params = vec![("perPage", PAGE_SIZE), ("page", page_param.as_str())];
            if let Some(f) = filter.as_deref() {
                params.push(("filter", f));
            }

            let url = self.url_with_query(CREDENTIALS, &params)?;
            let response = self.send(self.request(Method::GET, url), "list credentials")?;
            let batch = read_json::<ListResponse<Credential>>(response)?;
            debug!(page, total_pages = batch.total_pages, "credential page");

            let empty = batch.items.is_empty();
            records.extend(batch.items);
            if empty || page >= batch.total_pages {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    fn update_credential(&self, id: &str, record: &Credential) -> VaultResult<Credential> {
        let url = self.url(&format!("{}/{}", CREDENTIALS, id));
        let response = self.send(
            self.request(Method::PATCH, url).json(record),
            "update credential",
        )?;
        read_json(response)
    }

    fn delete_credential(&self, id: &str) -> VaultResult<()> {
        let url = self.url(&format!("{}/{}", CREDENTIALS, id));
        self.send(self.request(Method::DELETE, url), "delete credential")?;
        Ok(())
    }

    fn get_vault_config(&self) -> VaultResult<VaultConfig> {
        let url = self.url_with_query(VAULT_CONFIG, &[("perPage", "1")])?;
        let response = self.send(self.request(Method::GET, url), "get vault config")?;
        read_json::<ListResponse<VaultConfig>>(response)?
            .items
            .into_iter()
            .next()
            .ok_or_else(|| VaultError::NotFound("vault not initialized".into()))
    }

    fn save_vault_config(&self, config: &VaultConfig) -> VaultResult<VaultConfig> {
        let response = self.send(
            self.request(Method::POST, self.url(VAULT_CONFIG)).json(config),
            "save vault config",
        )?;
        read_json(response)
    }

    fn update_vault_config(&self, id: &str, config: &VaultConfig) -> VaultResult<VaultConfig> {
        let url = self.url(&format!("{}/{}", VAULT_CONFIG, id));
        let response = self.send(
            self.request(Method::PATCH, url).json(config),
            "update vault config",
        )?;
        read_json(response)
    }
}

/// PocketBase filter matching `term` in any searchable column
pub fn search_filter(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('\'', "\\'");
    ["title", "username", "url", "category"]
        .iter()
        .map(|field| format!("{}~'{}'", field, escaped))
        .collect::<Vec<_>>()
        .join(" || ")
}

fn check_status(response: Response, what: &str) -> VaultResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let detail = format!("{}: {} {}", what, status.as_u16(), body.trim());
    Err(match status {
        StatusCode::NOT_FOUND => VaultError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VaultError::OperatorAuthFailed(detail),
        _ => VaultError::Store(detail),
    })
}

fn read_json<T: DeserializeOwned>(response: Response) -> VaultResult<T> {
    response
        .json::<T>()
        .map_err(|e| VaultError::Store(format!("unexpected response body: {}", e)))
}
