//! Moodle target adapter
//!
//! Every call goes through the web-service gateway at
//! `{base_url}/webservice/rest/server.php` as a form-encoded POST naming the
//! function to run. Responses are JSON; an object carrying `exception` is a
//! failed call.

pub mod form;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::debug;
use url::Url;

use crate::api::client::ensure_success;
use crate::api::{
    truncate, ApiError, NewUser, Result, TargetDirectory, TargetUser, UserUpdate,
};

const FN_GET_USERS: &str = "core_user_get_users";
const FN_GET_USERS_BY_FIELD: &str = "core_user_get_users_by_field";
const FN_CREATE_USERS: &str = "core_user_create_users";
const FN_UPDATE_USERS: &str = "core_user_update_users";

/// Connection and provisioning settings for one Moodle site
#[derive(Clone)]
pub struct MoodleConfig {
    pub base_url: String,
    pub token: String,
    /// Authentication plugin assigned to created users
    pub auth_method: String,
    /// Institution stamped on created and updated users, when set
    pub default_institution: Option<String>,
}

impl fmt::Debug for MoodleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoodleConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("auth_method", &self.auth_method)
            .field("default_institution", &self.default_institution)
            .finish()
    }
}

/// Result of one lookup strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(TargetUser),
    NotFound,
    /// The token may not call this function; try the fallback strategy
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct MoodleUser {
    #[serde(deserialize_with = "deserialize_user_id")]
    id: i64,
    #[serde(default)]
    idnumber: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

/// Moodle ids are integers, though some gateways return them as strings.
fn user_id(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|id| id.trim().parse().ok()))
}

fn deserialize_user_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    user_id(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid user id {value}")))
}

impl From<MoodleUser> for TargetUser {
    fn from(user: MoodleUser) -> Self {
        let present = |value: Option<String>| value.filter(|v| !v.is_empty());
        TargetUser {
            id: user.id,
            external_id: present(user.idnumber),
            email: present(user.email),
            username: present(user.username),
        }
    }
}

pub struct MoodleClient {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
    auth_method: String,
    default_institution: Option<String>,
}

impl MoodleClient {
    pub fn new(http: reqwest::Client, config: MoodleConfig) -> Result<Self> {
        let base_url = config.base_url.trim();
        if base_url.is_empty() || config.token.is_empty() {
            return Err(ApiError::Config(
                "Missing Moodle base URL or token".to_string(),
            ));
        }

        let endpoint = Url::parse(&format!(
            "{}/webservice/rest/server.php",
            base_url.trim_end_matches('/')
        ))?;

        Ok(Self {
            http,
            endpoint,
            token: config.token,
            auth_method: config.auth_method,
            default_institution: config
                .default_institution
                .filter(|institution| !institution.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Invoke a web-service function and return its decoded JSON result.
    pub async fn call(&self, function: &str, params: Value) -> Result<Value> {
        let mut pairs = vec![
            ("wstoken".to_string(), self.token.clone()),
            ("wsfunction".to_string(), function.to_string()),
            ("moodlewsrestformat".to_string(), "json".to_string()),
        ];
        if let Value::Object(params) = &params {
            pairs.extend(form::flatten_params(params));
        }
        let body = serde_urlencoded::to_string(&pairs)?;

        debug!(function, "Calling Moodle web service");
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let text = response.text().await?;

        let parsed: Value = serde_json::from_str(&text).map_err(|_| ApiError::UnexpectedResponse {
            function: function.to_string(),
            body: format!("non-JSON response: {}", truncate(&text, 500)),
        })?;

        if let Some(exception) = remote_exception(function, &parsed) {
            return Err(exception);
        }

        Ok(parsed)
    }

    /// Preferred strategy: `core_user_get_users` with a single criterion.
    pub async fn lookup_by_criteria(&self, field: &str, value: &str) -> Result<Lookup> {
        let params = json!({ "criteria": [{ "key": field, "value": value }] });

        match self.call(FN_GET_USERS, params).await {
            Ok(result) => first_user(result.get("users")),
            Err(error) if error.is_access_exception() => Ok(Lookup::Unsupported),
            Err(error) => Err(error),
        }
    }

    /// Fallback strategy for tokens restricted to `core_user_get_users_by_field`.
    pub async fn lookup_by_field(&self, field: &str, value: &str) -> Result<Lookup> {
        let params = json!({ "field": field, "values": [value] });
        let result = self.call(FN_GET_USERS_BY_FIELD, params).await?;
        first_user(Some(&result))
    }

    /// Find a single user by `field`, chaining to the fallback strategy only
    /// when the preferred one is unsupported.
    pub async fn find_user(&self, field: &str, value: &str) -> Result<Option<TargetUser>> {
        if value.is_empty() {
            return Ok(None);
        }

        let lookup = match self.lookup_by_criteria(field, value).await? {
            Lookup::Unsupported => {
                debug!(field, "core_user_get_users restricted, falling back to lookup by field");
                self.lookup_by_field(field, value).await?
            }
            other => other,
        };

        Ok(match lookup {
            Lookup::Found(user) => Some(user),
            Lookup::NotFound | Lookup::Unsupported => None,
        })
    }

    fn create_payload(&self, user: &NewUser) -> Value {
        let mut fields = Map::new();
        fields.insert("username".into(), json!(user.username));
        fields.insert("auth".into(), json!(self.auth_method));
        fields.insert("password".into(), json!(user.password));
        fields.insert("firstname".into(), json!(user.first_name));
        fields.insert("lastname".into(), json!(user.last_name));
        fields.insert("email".into(), json!(user.email));
        fields.insert("idnumber".into(), json!(user.external_id));
        fields.insert("suspended".into(), json!(user.suspended));
        if let Some(department) = &user.department {
            fields.insert("department".into(), json!(department));
        }
        if let Some(institution) = &self.default_institution {
            fields.insert("institution".into(), json!(institution));
        }
        json!({ "users": [Value::Object(fields)] })
    }

    fn update_payload(&self, update: &UserUpdate) -> Value {
        let mut fields = Map::new();
        fields.insert("id".into(), json!(update.id));
        fields.insert("idnumber".into(), json!(update.external_id));
        fields.insert("suspended".into(), json!(update.suspended));

        let optional = [
            ("firstname", &update.first_name),
            ("lastname", &update.last_name),
            ("email", &update.email),
            ("department", &update.department),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                fields.insert(key.into(), json!(value));
            }
        }
        if let Some(institution) = &self.default_institution {
            fields.insert("institution".into(), json!(institution));
        }
        json!({ "users": [Value::Object(fields)] })
    }
}

#[async_trait]
impl TargetDirectory for MoodleClient {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<TargetUser>> {
        self.find_user("idnumber", external_id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<TargetUser>> {
        self.find_user("email", email).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<TargetUser> {
        let result = self.call(FN_CREATE_USERS, self.create_payload(user)).await?;

        let id = result
            .as_array()
            .and_then(|created| created.first())
            .and_then(|first| first.get("id"))
            .and_then(user_id);

        match id {
            Some(id) => Ok(TargetUser {
                id,
                external_id: Some(user.external_id.clone()),
                email: Some(user.email.clone()),
                username: Some(user.username.clone()),
            }),
            None => Err(ApiError::UnexpectedResponse {
                function: FN_CREATE_USERS.to_string(),
                body: truncate(&result.to_string(), 500).to_string(),
            }),
        }
    }

    async fn update_user(&self, update: &UserUpdate) -> Result<()> {
        let result = self.call(FN_UPDATE_USERS, self.update_payload(update)).await?;

        let warnings = result
            .get("warnings")
            .and_then(Value::as_array)
            .filter(|warnings| !warnings.is_empty());

        match warnings {
            Some(warnings) => Err(ApiError::Warnings {
                function: FN_UPDATE_USERS.to_string(),
                warnings: Value::Array(warnings.clone()).to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn remote_exception(function: &str, parsed: &Value) -> Option<ApiError> {
    let object = parsed.as_object()?;
    let raised = match object.get("exception") {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    };
    if !raised {
        return None;
    }

    let text = |key: &str, default: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };

    Some(ApiError::Remote {
        function: function.to_string(),
        errorcode: text("errorcode", "unknown"),
        message: text("message", "no message"),
    })
}

fn first_user(users: Option<&Value>) -> Result<Lookup> {
    let first = users
        .and_then(Value::as_array)
        .and_then(|users| users.first())
        .cloned();

    match first {
        Some(user) => {
            let user: MoodleUser = serde_json::from_value(user)?;
            Ok(Lookup::Found(user.into()))
        }
        None => Ok(Lookup::NotFound),
    }
}
