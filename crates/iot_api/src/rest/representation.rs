use crate::domain::DevicePage;
use chrono::{DateTime, Utc};
use common::objects::DeviceObject;
use http::header::HOST;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// A hyperlink attached to a representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
}

impl Link {
    /// `{base}/v1/{resource}/{args}`, or `{base}/{resource}/{args}` for
    /// bookmarks, which are not tied to an API version.
    pub fn make_link(rel: &str, base_url: &str, resource: &str, args: &str, bookmark: bool) -> Self {
        let href = if bookmark {
            format!("{}/{}/{}", base_url, resource, args)
        } else {
            format!("{}/v1/{}/{}", base_url, resource, args)
        };
        Self {
            href,
            rel: rel.to_string(),
        }
    }
}

/// Base URL for links: the configured public URL, else the Host header.
pub fn base_url(public_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = public_url.filter(|url| !url.is_empty()) {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

/// API representation of a device. The internal `id` is never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRepresentation {
    pub uuid: String,
    pub name: String,
    pub desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub links: Vec<Link>,
}

impl DeviceRepresentation {
    /// The summary form carries `uuid`, `name` and `desc`; `expand` adds the
    /// rest of the schema except `id`.
    pub fn convert_with_links(device: &DeviceObject, base_url: &str, expand: bool) -> Self {
        let uuid = device.uuid.clone().unwrap_or_default();
        let links = vec![
            Link::make_link("self", base_url, "devices", &uuid, false),
            Link::make_link("bookmark", base_url, "devices", &uuid, true),
        ];

        let mut representation = Self {
            uuid,
            name: device.name.clone().unwrap_or_default(),
            desc: device.desc.clone().unwrap_or_default(),
            project_id: None,
            user_id: None,
            created_at: None,
            updated_at: None,
            links,
        };

        if expand {
            representation.project_id = device.project_id.clone();
            representation.user_id = device.user_id.clone();
            representation.created_at = device.created_at;
            representation.updated_at = device.updated_at;
        }
        representation
    }
}

/// API representation of a page of devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCollection {
    pub devices: Vec<DeviceRepresentation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl DeviceCollection {
    pub fn convert_with_links(page: &DevicePage, base_url: &str, resource: &str, expand: bool) -> Self {
        Self {
            devices: page
                .devices
                .iter()
                .map(|device| DeviceRepresentation::convert_with_links(device, base_url, expand))
                .collect(),
            next: Self::get_next(page, base_url, resource),
        }
    }

    /// A full page means there may be more; the link continues after its
    /// last item with the same ordering.
    fn get_next(page: &DevicePage, base_url: &str, resource: &str) -> Option<String> {
        if page.devices.len() != page.limit {
            return None;
        }
        let marker = page.devices.last()?.uuid.as_deref()?;
        Some(format!(
            "{}/v1/{}?sort_key={}&sort_dir={}&limit={}&marker={}",
            base_url, resource, page.sort_key, page.sort_dir, page.limit, marker
        ))
    }
}
