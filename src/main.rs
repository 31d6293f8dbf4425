use bprotocol::types::{whole, EXP_SCALE};
use bprotocol::{AssetBank, BComptroller, InMemoryMarket, MoneyMarket, ProtocolConfig, Registry};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bprotocol", about = "Avatar-proxied lending wrapper demo")]
struct Cli {
    /// Path to the protocol config file
    #[arg(long, default_value = "bprotocol.toml")]
    config: String,
}

fn main() {
    let cli = Cli::parse();
    let config = ProtocolConfig::load_or_default(&cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.node.log_level.clone())),
        )
        .init();

    if let Err(e) = run(&config) {
        eprintln!("scenario failed: {}", e);
        std::process::exit(1);
    }
}

/// Scripted walkthrough: deposit, delegate, borrow, repay
fn run(config: &ProtocolConfig) -> bprotocol::Result<()> {
    let mut registry = Registry::new();
    let mut market = InMemoryMarket::new(config.market.collateral_factor_percent);
    let mut bank = AssetBank::new();
    let mut comptroller = BComptroller::new();

    comptroller.set_registry(&registry)?;

    let czrx = "cZRX".to_string();
    let cbat = "cBAT".to_string();
    market.list_market(&czrx, EXP_SCALE);
    market.list_market(&cbat, EXP_SCALE);
    comptroller.new_btoken(&czrx, &"ZRX".to_string(), "B Wrapped ZRX", "bZRX")?;
    comptroller.new_btoken(&cbat, &"BAT".to_string(), "B Wrapped BAT", "bBAT")?;

    let alice = "alice".to_string();
    let bob = "bob".to_string();
    bank.set_balance(&alice, &"ZRX".to_string(), whole(1000));
    bank.set_balance(&bob, &"BAT".to_string(), whole(1000));

    // Alice deposits ZRX collateral, Bob supplies the BAT market
    let bzrx = comptroller
        .btoken_mut(&czrx)
        .ok_or(bprotocol::ProtocolError::UnknownMarket(czrx.clone()))?;
    bzrx.mint(&mut registry, &mut market, &mut bank, &alice, whole(1000))?;

    let bbat = comptroller
        .btoken_mut(&cbat)
        .ok_or(bprotocol::ProtocolError::UnknownMarket(cbat.clone()))?;
    bbat.mint(&mut registry, &mut market, &mut bank, &bob, whole(1000))?;

    info!(
        shares = bbat.balance_of(&registry, &market, &bob),
        "bob wrapper balance after mint"
    );

    // Alice borrows BAT against her ZRX position and repays part of it
    bbat.borrow(&mut registry, &mut market, &mut bank, &alice, whole(100))?;
    info!(
        wallet = bank.balance_of(&alice, &"BAT".to_string()),
        debt = bbat.borrow_balance_current(&registry, &market, &alice),
        "alice after borrow"
    );

    bbat.repay_borrow(&mut registry, &mut market, &mut bank, &alice, whole(1))?;
    info!(
        wallet = bank.balance_of(&alice, &"BAT".to_string()),
        debt = bbat.borrow_balance_current(&registry, &market, &alice),
        reserve = market.cash(&cbat),
        "alice after repay"
    );

    // Alice delegates to Bob, who redeems a share on her behalf
    registry.delegate_avatar(&alice, &bob)?;
    let avatar = registry
        .avatar_of(&alice)
        .cloned()
        .ok_or(bprotocol::ProtocolError::UnknownAvatar(alice.clone()))?;
    let bzrx = comptroller
        .btoken_mut(&czrx)
        .ok_or(bprotocol::ProtocolError::UnknownMarket(czrx.clone()))?;
    bzrx.redeem_on_avatar(&mut registry, &mut market, &mut bank, &bob, &avatar, 100_000_000)?;
    info!(
        proceeds = bank.balance_of(&bob, &"ZRX".to_string()),
        "bob redeemed on alice's avatar"
    );

    Ok(())
}
