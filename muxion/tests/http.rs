use reqwest::StatusCode;
use tempfile::TempDir;

mod common;
use common::{movie_bytes, Upstream, MOVIE_SIZE};

#[tokio::test]
async fn test_link_proxies_with_range() -> anyhow::Result<()> {
    let upstream = Upstream::start().await?;
    let dir = TempDir::new()?;
    let state = muxion::new_state(common::config(&upstream, dir.path())).await?;
    let addr = common::spawn_app(state).await?;
    let client = reqwest::Client::new();

    let link: api::response::TemporaryLink = client
        .post(format!("http://{addr}{}", api::path::LINKS))
        .json(&api::request::CreateLink {
            user: "alice".to_string(),
            url: upstream.url("/movie/7.mp4"),
            title: Some("Seven".to_string()),
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(link.path, api::path::link(&link.token));

    let response = client
        .get(format!("http://{addr}{}", link.path))
        .header("range", "bytes=100-199")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()["content-range"],
        format!("bytes 100-199/{}", MOVIE_SIZE)
    );
    assert_eq!(response.headers()["content-type"], "video/mp4");
    assert_eq!(&response.bytes().await?[..], &movie_bytes()[100..200]);
    assert_eq!(upstream.hits("/movie/7.mp4"), 1);

    let status = client
        .get(format!("http://{addr}{}", api::path::link("unknown")))
        .send()
        .await?
        .status();
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_link_rejects_bad_url_and_failing_upstream() -> anyhow::Result<()> {
    let upstream = Upstream::start().await?;
    let dir = TempDir::new()?;
    let state = muxion::new_state(common::config(&upstream, dir.path())).await?;
    let addr = common::spawn_app(state).await?;
    let client = reqwest::Client::new();

    let status = client
        .post(format!("http://{addr}{}", api::path::LINKS))
        .json(&api::request::CreateLink {
            user: "alice".to_string(),
            url: "file:///etc/passwd".to_string(),
            title: None,
        })
        .send()
        .await?
        .status();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let link: api::response::TemporaryLink = client
        .post(format!("http://{addr}{}", api::path::LINKS))
        .json(&api::request::CreateLink {
            user: "alice".to_string(),
            url: upstream.url("/fail/7.mp4"),
            title: None,
        })
        .send()
        .await?
        .json()
        .await?;
    let status = client
        .get(format!("http://{addr}{}", link.path))
        .send()
        .await?
        .status();
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    Ok(())
}

#[tokio::test]
async fn test_metrics() -> anyhow::Result<()> {
    muxion::metrics_register();
    let upstream = Upstream::start().await?;
    let dir = TempDir::new()?;
    let state = muxion::new_state(common::config(&upstream, dir.path())).await?;
    let addr = common::spawn_app(state).await?;

    let body = reqwest::get(format!("http://{addr}{}", api::path::METRICS))
        .await?
        .error_for_status()?
        .text()
        .await?;
    assert!(body.contains("tvmux_stream"));
    assert!(body.contains("tvmux_vod_downloading"));
    Ok(())
}
