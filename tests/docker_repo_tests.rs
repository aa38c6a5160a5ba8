// Optional DockerRepo tests when Docker daemon is available

use gtop::docker_repo::{ContainerRuntime, DockerRepo};

#[tokio::test]
async fn docker_repo_connect_and_list_running() {
    let repo = match DockerRepo::connect() {
        Ok(r) => r,
        Err(_) => return, // Skip when Docker is not available (e.g. CI without Docker)
    };
    let containers = match repo.running_containers().await {
        Ok(c) => c,
        Err(_) => return, // Socket present but daemon not answering
    };
    for c in &containers {
        assert!(!c.id.is_empty());
        assert!(!c.name.starts_with('/'));
        let pids = repo.container_pids(&c.id).await.unwrap_or_default();
        assert!(pids.iter().all(|p| *p > 0));
    }
}

#[tokio::test]
async fn docker_repo_unknown_container_is_query_error() {
    let repo = match DockerRepo::connect() {
        Ok(r) => r,
        Err(_) => return,
    };
    if repo.running_containers().await.is_err() {
        return;
    }
    assert!(repo.container_pids("gtop-no-such-container").await.is_err());
}
