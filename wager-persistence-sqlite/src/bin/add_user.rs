use wager_persistence_sqlite::{open_pool, users::SqliteUserRepository};
use wager_server_domain::user::{Role, User, UserRepository};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 && args.len() != 5 {
        eprintln!("Usage: add_user <username> <email> <password> [<role>]");
        std::process::exit(1);
    }

    let db_path = std::env::var("WAGER_DB").expect("WAGER_DB env var not set");

    let username = &args[1];
    let email = args[2].trim().to_lowercase();
    let password = &args[3];
    let role: Role = if args.len() == 5 {
        args[4].parse().expect("Role must be user or admin")
    } else {
        Role::User
    };

    let pool = open_pool(&db_path).await.expect("Failed to open database");
    let repository = SqliteUserRepository::new(pool);

    let pw_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST).expect("Failed to hash password");
    let user = User::new(email, username.to_string(), pw_hash, role);
    repository
        .create_user(&user)
        .await
        .unwrap_or_else(|e| panic!("Failed to create user [{}]: {}", username, e));

    println!(
        "Created {} [{}] with password [{}], id {}",
        role.as_str(),
        username,
        password,
        user.id
    );
}
