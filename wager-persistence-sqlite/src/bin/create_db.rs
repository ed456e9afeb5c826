use wager_persistence_sqlite::{open_pool, users::SqliteUserRepository};
use wager_server_domain::user::{Role, User, UserRepository};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let db_path = std::env::var("WAGER_DB").expect("WAGER_DB env var not set");
    let path = std::path::Path::new(&db_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory for DB");
        println!("Created parent directory for DB at {}", parent.display());
    }
    if path.exists() {
        std::fs::remove_file(path).expect("Failed to remove existing DB");
        println!("Removed existing DB at {}", db_path);
    }

    let pool = open_pool(&db_path).await.expect("Failed to create DB");
    println!("Created new DB at {}", db_path);

    let repository = SqliteUserRepository::new(pool);
    create_user(&repository, "admin", Role::Admin).await;
    create_user(&repository, "testuser", Role::User).await;
}

async fn create_user(repository: &SqliteUserRepository, name: &str, role: Role) {
    let pw_hash = bcrypt::hash("pw", bcrypt::DEFAULT_COST).expect("Failed to hash password");
    let user = User::new(
        format!("{}@example.com", name),
        name.to_string(),
        pw_hash,
        role,
    );
    repository
        .create_user(&user)
        .await
        .expect("Failed to create user");
    println!("Created {} {}", role.as_str(), name);
}
