//! Pull display fields out of an ad creative.
//!
//! A creative describes its content in one of several shapes under
//! `object_story_spec` (`link_data`, `video_data`, `carousel_data`, ...), or,
//! for dynamic creatives, as lists of alternatives in `asset_feed_spec`. The
//! asset feed wins when present; otherwise the most specific story shape
//! decides the type and fills the gaps left by the generic lookups.

use insightfy_core::ads::{CreativeSummary, CreativeType};
use serde_json::{Map, Value};

/// Result of [`extract`]: the summary, plus the asset feed spec worth
/// storing (non-empty only).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
  pub summary:         CreativeSummary,
  pub asset_feed_spec: Option<Value>,
}

/// A non-empty string at `pointer`. Numeric ids are stringified.
fn text(v: &Value, pointer: &str) -> Option<String> {
  match v.pointer(pointer)? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// The first pointer that yields text.
fn first(v: &Value, pointers: &[&str]) -> Option<String> { pointers.iter().find_map(|p| text(v, p)) }

fn has(v: &Value, key: &str) -> bool { v.get(key).is_some_and(|x| !x.is_null()) }

/// Type from the story spec alone, in the order Meta's own tooling checks.
fn story_type(oss: &Value) -> Option<CreativeType> {
  [
    ("video_data", CreativeType::Video),
    ("carousel_data", CreativeType::Carousel),
    ("link_data", CreativeType::Image),
    ("collection_data", CreativeType::Collection),
    ("photo_data", CreativeType::Photo),
    ("text_data", CreativeType::Text),
  ]
  .into_iter()
  .find_map(|(key, kind)| has(oss, key).then_some(kind))
}

fn generic_link(oss: &Value) -> Option<String> {
  first(oss, &[
    "/link_data/link",
    "/link_data/call_to_action/value/link_url",
    "/video_data/link",
    "/video_data/call_to_action/value/link_url",
    "/carousel_data/link",
    "/carousel_data/call_to_action/value/link_url",
    "/collection_data/link",
  ])
}

/// Start from the generic lookups that apply to any story shape.
fn generic(creative: &Value, oss: &Value) -> CreativeSummary {
  let thumbnail = text(creative, "/thumbnail_url");
  CreativeSummary {
    creative_id:    text(creative, "/id"),
    creative_type:  Some(story_type(oss).unwrap_or(CreativeType::Unknown)),
    title:          first(oss, &[
      "/link_data/name",
      "/carousel_data/child_attachments/0/name",
      "/carousel_data/name",
      "/collection_data/name",
      "/video_data/title",
    ]),
    body:           first(oss, &[
      "/link_data/message",
      "/video_data/message",
      "/carousel_data/message",
      "/photo_data/caption",
      "/text_data/message",
    ]),
    call_to_action: first(oss, &[
      "/link_data/call_to_action/type",
      "/video_data/call_to_action/type",
      "/carousel_data/call_to_action/type",
      "/collection_data/call_to_action/type",
    ]),
    link_url:       generic_link(oss),
    image_url:      thumbnail.clone().or_else(|| {
      first(oss, &[
        "/link_data/image_url",
        "/carousel_data/child_attachments/0/image_url",
        "/photo_data/url",
        "/video_data/image_url",
      ])
    }),
    video_url:      first(oss, &["/video_data/video_url", "/video_data/video_id"]),
    thumbnail_url:  thumbnail,
  }
}

fn is_dynamic(afs: &Value) -> bool { ["images", "videos", "bodies", "titles"].iter().any(|k| has(afs, k)) }

fn apply_asset_feed(s: &mut CreativeSummary, afs: &Value) {
  s.creative_type = Some(CreativeType::DynamicCreative);
  if let Some(v) = text(afs, "/titles/0/text") {
    s.title = Some(v);
  }
  if let Some(v) = text(afs, "/bodies/0/text") {
    s.body = Some(v);
  }
  if let Some(v) = text(afs, "/link_urls/0/website_url") {
    s.link_url = Some(v);
  }
  if let Some(v) = text(afs, "/call_to_action_types/0") {
    s.call_to_action = Some(v);
  }
  if let Some(url) = text(afs, "/images/0/url") {
    s.image_url = Some(url.clone());
    s.thumbnail_url = Some(url);
  } else if afs.pointer("/videos/0").is_some() {
    if let Some(v) = text(afs, "/videos/0/video_id") {
      s.video_url = Some(v);
    }
    if let Some(v) = text(afs, "/videos/0/thumbnail_url") {
      s.thumbnail_url = Some(v);
    }
  }
}

/// Prefer `primary`, keep `current` otherwise.
fn prefer(current: &mut Option<String>, primary: Option<String>) {
  if primary.is_some() {
    *current = primary;
  }
}

/// Fill only if still empty.
fn fill(current: &mut Option<String>, fallback: Option<String>) {
  if current.is_none() {
    *current = fallback;
  }
}

fn apply_story_shape(s: &mut CreativeSummary, oss: &Value) {
  if let Some(carousel) = oss.get("carousel_data").filter(|v| !v.is_null()) {
    s.creative_type = Some(CreativeType::Carousel);
    if let Some(child) = carousel.pointer("/child_attachments/0") {
      prefer(&mut s.title, first(child, &["/name"]).or_else(|| text(carousel, "/name")));
      prefer(&mut s.body, text(child, "/description").or_else(|| text(carousel, "/message")));
      prefer(
        &mut s.call_to_action,
        text(child, "/call_to_action/type").or_else(|| text(carousel, "/call_to_action/type")),
      );
      prefer(&mut s.link_url, text(child, "/link").or_else(|| text(carousel, "/link")));
      let picture = first(child, &["/image_url", "/picture"]);
      fill(&mut s.image_url, picture.clone());
      fill(&mut s.thumbnail_url, picture);
    } else {
      prefer(&mut s.title, text(carousel, "/name"));
      prefer(&mut s.body, text(carousel, "/message"));
      prefer(&mut s.call_to_action, text(carousel, "/call_to_action/type"));
      prefer(&mut s.link_url, text(carousel, "/link"));
    }
  } else if let Some(collection) = oss.get("collection_data").filter(|v| !v.is_null()) {
    s.creative_type = Some(CreativeType::Collection);
    prefer(&mut s.title, text(collection, "/name"));
    prefer(&mut s.body, text(collection, "/description"));
    prefer(&mut s.call_to_action, text(collection, "/call_to_action/type"));
    prefer(&mut s.link_url, text(collection, "/link"));
    let cover = text(collection, "/cover_image_url");
    fill(&mut s.image_url, cover.clone());
    fill(&mut s.thumbnail_url, cover);
  } else if let Some(link) = oss.get("link_data").filter(|v| !v.is_null()) {
    s.creative_type = Some(CreativeType::Image);
    prefer(&mut s.title, text(link, "/name"));
    prefer(&mut s.body, text(link, "/message"));
    prefer(&mut s.call_to_action, text(link, "/call_to_action/type"));
    prefer(&mut s.link_url, text(link, "/link"));
    fill(&mut s.image_url, first(link, &["/picture", "/image_url"]));
  } else if let Some(video) = oss.get("video_data").filter(|v| !v.is_null()) {
    s.creative_type = Some(CreativeType::Video);
    prefer(&mut s.title, text(video, "/title"));
    prefer(&mut s.body, text(video, "/message"));
    prefer(&mut s.call_to_action, text(video, "/call_to_action/type"));
    prefer(&mut s.link_url, text(video, "/link"));
    prefer(&mut s.video_url, text(video, "/video_id"));
    let still = text(video, "/image_url");
    fill(&mut s.image_url, still.clone());
    fill(&mut s.thumbnail_url, still);
  } else if let Some(photo) = oss.get("photo_data").filter(|v| !v.is_null()) {
    s.creative_type = Some(CreativeType::Photo);
    prefer(&mut s.body, text(photo, "/caption"));
    fill(&mut s.image_url, text(photo, "/url"));
  } else if let Some(plain) = oss.get("text_data").filter(|v| !v.is_null()) {
    s.creative_type = Some(CreativeType::Text);
    prefer(&mut s.body, text(plain, "/message"));
  }
}

/// Summarize an ad's `creative` object. `ad_asset_feed` is the ad-level
/// `asset_feed_spec`, used when the creative carries none.
pub fn extract(creative: Option<&Value>, ad_asset_feed: Option<&Value>) -> Extracted {
  let empty = Value::Object(Map::new());
  let creative = creative.unwrap_or(&empty);
  let oss = creative.get("object_story_spec").filter(|v| !v.is_null()).unwrap_or(&empty);
  let afs = creative
    .get("asset_feed_spec")
    .filter(|v| !v.is_null())
    .or(ad_asset_feed)
    .unwrap_or(&empty);

  let mut summary = generic(creative, oss);
  if is_dynamic(afs) {
    apply_asset_feed(&mut summary, afs);
  } else {
    apply_story_shape(&mut summary, oss);
  }
  fill(&mut summary.link_url, generic_link(oss));

  let asset_feed_spec = afs
    .as_object()
    .filter(|m| !m.is_empty())
    .map(|_| afs.clone());

  Extracted { summary, asset_feed_spec }
}
