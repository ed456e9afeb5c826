use uuid::Uuid;
use wager_client::{NewGame, WagerClient};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let api_url =
        std::env::var("WAGER_E2E_URL").unwrap_or_else(|_| "http://127.0.0.1:3000/api/v1".into());
    let admin_email =
        std::env::var("WAGER_E2E_ADMIN_EMAIL").unwrap_or_else(|_| "admin@example.com".into());
    let admin_password = std::env::var("WAGER_E2E_ADMIN_PASSWORD").unwrap_or_else(|_| "pw".into());

    let admin = WagerClient::new(&api_url);
    admin
        .login(&admin_email, &admin_password)
        .await
        .expect("Admin login failed");

    let player = WagerClient::new(&api_url);
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_string();
    let user = player
        .register(
            &format!("e2e_{}@example.com", suffix),
            &format!("e2e_{}", suffix),
            "password",
        )
        .await
        .expect("Registration failed");
    println!("Registered {} ({})", user.username, user.id);

    let credit = admin
        .admin_balance(user.id, "credit", 500.0, "e2e starting balance")
        .await
        .expect("Credit failed");
    println!("Credited {} [{}]", credit.amount, credit.status);

    let deposit = player.deposit(100.0).await.expect("Deposit failed");
    println!("Deposited {} [{}]", deposit.amount, deposit.status);

    let games = player.games().await.expect("Listing games failed");
    let game = match games.into_iter().next() {
        Some(game) => game,
        None => admin
            .create_game(&NewGame {
                name: format!("E2E Dice {}", suffix),
                description: "Created by the e2e run".to_string(),
                min_bet: 1.0,
                max_bet: 100.0,
                house_edge: None,
                payout_multiplier: None,
                kind: None,
            })
            .await
            .expect("Creating game failed"),
    };
    println!("Playing {} ({})", game.name, game.id);

    for _ in 0..5 {
        let receipt = player
            .place_bet(game.id, game.min_bet.max(1.0))
            .await
            .expect("Bet failed");
        println!(
            "Bet {} -> won: {}, payout: {}",
            receipt.bet, receipt.outcome.won, receipt.outcome.payout
        );
    }

    let balance = player
        .session()
        .await
        .map(|session| session.user.balance)
        .unwrap_or_default();
    println!("Balance after bets: {}", balance);

    let transactions = player
        .my_transactions(1, 20)
        .await
        .expect("Listing transactions failed");
    println!("{} transactions recorded", transactions.pagination.total);

    let leaderboard = player
        .leaderboard("daily", 1, 10)
        .await
        .expect("Leaderboard failed");
    for entry in leaderboard.entries {
        println!("#{} {} {:.2}", entry.rank, entry.username, entry.score);
    }
}
