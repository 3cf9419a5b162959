use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use ipedia_server::client::{AdminClient, IpediaClient};
use ipedia_server::protocol::{DecodedResponse, FieldName};

#[derive(Parser)]
#[command(name = "ipedia-cli")]
#[command(about = "Client and operator CLI for the iPedia server", long_about = None)]
struct Cli {
    /// Client protocol address.
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    server: SocketAddr,

    /// Administrative channel address.
    #[arg(short, long, default_value = "127.0.0.1:9001")]
    admin: SocketAddr,

    /// Cookie to identify with.
    #[arg(long, global = true)]
    cookie: Option<String>,

    /// Registration code to identify with.
    #[arg(long, global = true)]
    reg_code: Option<String>,

    /// Device info sent with Get-Cookie when no cookie or code is given.
    #[arg(long, global = true, default_value = "PL3030")]
    device_info: String,

    /// Language to query.
    #[arg(long, global = true)]
    lang: Option<String>,

    /// Print responses as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get a fresh cookie for the device info
    GetCookie,
    /// Look up an article by title
    Get { title: String },
    /// Fetch a random article
    Random,
    /// Full-text search
    Search { term: String },
    /// Show article count, database date and available languages
    Info,
    /// Check a registration code
    Verify { code: String },
    /// List databases (admin channel)
    List,
    /// Switch the current database of its language (admin channel)
    Use { db_name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let request: Vec<(FieldName, Option<&str>)> = match &cli.command {
        Commands::List => return admin(cli.admin, "list").await,
        Commands::Use { db_name } => return admin(cli.admin, &format!("use {db_name}")).await,
        Commands::GetCookie => vec![],
        Commands::Get { title } => vec![(FieldName::GetArticle, Some(title.as_str()))],
        Commands::Random => vec![(FieldName::GetRandomArticle, None)],
        Commands::Search { term } => vec![(FieldName::Search, Some(term.as_str()))],
        Commands::Info => vec![
            (FieldName::GetArticleCount, None),
            (FieldName::GetDatabaseTime, None),
            (FieldName::GetAvailableLangs, None),
        ],
        Commands::Verify { code } => vec![(FieldName::VerifyRegistrationCode, Some(code.as_str()))],
    };

    let mut fields = request;
    match (&cli.cookie, &cli.reg_code) {
        (Some(cookie), _) => fields.push((FieldName::Cookie, Some(cookie.as_str()))),
        (None, Some(code)) => fields.push((FieldName::RegistrationCode, Some(code.as_str()))),
        (None, None) => fields.push((FieldName::GetCookie, Some(cli.device_info.as_str()))),
    }
    if let Some(lang) = &cli.lang {
        fields.push((FieldName::UseLang, Some(lang.as_str())));
    }

    let client = IpediaClient::new(cli.server);
    let (_, response) = client.request(&fields).await?;
    print_response(&response, cli.json)?;
    Ok(())
}

async fn admin(addr: SocketAddr, command: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = AdminClient::connect(addr).await?;
    for line in client.command(command).await? {
        println!("{line}");
    }
    Ok(())
}

fn print_response(response: &DecodedResponse, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let mut map = Map::new();
        for (name, value) in response.fields() {
            let value = value
                .map(|v| Value::String(String::from_utf8_lossy(v).into_owned()))
                .unwrap_or(Value::Null);
            map.insert(name.to_owned(), value);
        }
        println!("{}", serde_json::to_string_pretty(&Value::Object(map))?);
        return Ok(());
    }

    for (name, value) in response.fields() {
        match value {
            Some(v) if v.contains(&b'\n') => {
                println!("{name}:");
                println!("{}", String::from_utf8_lossy(v));
            }
            Some(v) => println!("{name}: {}", String::from_utf8_lossy(v)),
            None => println!("{name}:"),
        }
    }
    if let Some(err) = response.error() {
        eprintln!("Error: {err} ({})", err.code());
    }
    Ok(())
}
