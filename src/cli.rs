// command line interface

use std::io::Read;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use crate::core::{
    DATASTORE_ENV, DEFAULT_DATABASE, DataLake, Datastore, PollConfig, get_table_schema,
    list_database_tables, list_databases, normalize_name, reserved_words_info, run_query,
    validate_sql_comprehensive,
};
use crate::{Output, Server};

#[derive(Parser)]
#[command(name = "sqlguard", about = "Vet and adapt sql for the panther data lake")]
struct Cli {
    /// warehouse behind panther (snowflake, redshift)
    #[arg(long, short, env = DATASTORE_ENV, default_value = "snowflake", global = true)]
    datastore: String,

    /// print json instead of text
    #[arg(long, global = true)]
    json: bool,

    /// panther graphql endpoint
    #[arg(long, env = "PANTHER_GQL_API_URL", global = true)]
    api_url: Option<String>,

    /// panther api key
    #[arg(long, short = 'k', env = "PANTHER_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// validate a query and print the rewritten sql
    Check {
        /// sql text, or - to read stdin
        sql: String,

        /// don't require a p_event_time filter or time macro
        #[arg(long)]
        no_time_filter: bool,

        /// allow ddl/dml keywords
        #[arg(long)]
        allow_writes: bool,

        /// panther database the query targets
        #[arg(long)]
        database: Option<String>,
    },

    /// turn log type names into table names
    Normalize {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// list reserved words for the datastore
    Words,

    /// query writing tips for the datastore
    Syntax,

    /// print a sample-events query for a log type
    Sample {
        /// log type, e.g. AWS.CloudTrail
        log_type: String,
    },

    /// validate, then run a query on the data lake
    Run {
        /// sql text, or - to read stdin
        sql: String,

        #[arg(long, default_value = DEFAULT_DATABASE)]
        database: String,

        /// seconds before the query is cancelled
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// list data lake databases
    Databases,

    /// list the tables in a database
    Tables {
        #[arg(default_value = DEFAULT_DATABASE)]
        database: String,
    },

    /// show a table's columns
    Schema {
        /// database, e.g. panther_logs.public
        database: String,

        /// table, e.g. aws_cloudtrail
        table: String,
    },

    /// start as http server
    Serve {
        /// port number
        #[arg(long, short, default_value = "3000")]
        port: u16,

        /// host to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn read_sql(arg: String) -> Result<String> {
    if arg != "-" {
        return Ok(arg);
    }
    let mut sql = String::new();
    std::io::stdin().read_to_string(&mut sql).into_diagnostic()?;
    Ok(sql)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let datastore = Datastore::from(cli.datastore.as_str());

    match cli.command {
        Commands::Check {
            sql,
            no_time_filter,
            allow_writes,
            database,
        } => {
            let sql = read_sql(sql)?;
            let result = validate_sql_comprehensive(
                &sql,
                !no_time_filter,
                !allow_writes,
                database.as_deref(),
                datastore,
            );

            if cli.json {
                Output::raw(&result);
            } else {
                Output::verdict(&result);
            }

            if !result.valid {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Normalize { names } => {
            for name in names {
                if cli.json {
                    Output::raw(&serde_json::json!({
                        "name": name,
                        "normalized": normalize_name(&name),
                    }));
                } else {
                    println!("{}", normalize_name(&name));
                }
            }
            Ok(())
        }

        Commands::Words => {
            let info = reserved_words_info(datastore);
            if cli.json {
                Output::raw(&info);
            } else {
                println!("datastore: {}\n", info.datastore_type);
                println!("quotable: {}\n", info.quotable_reserved_words.join(" "));
                println!("forbidden in scalar expressions: {}", info.forbidden_scalar_expressions.join(" "));
                println!("forbidden as column names: {}\n", info.forbidden_column_names.join(" "));
                println!("{}", info.guidance);
            }
            Ok(())
        }

        Commands::Syntax => {
            let help = datastore.syntax_help();
            if cli.json {
                Output::raw(&help);
            } else {
                println!("datastore: {}\n", help.datastore_type);
                println!("{}\n", help.database_references);
                println!("{}\n", help.date_functions);
                println!("{}\n", help.time_filters);
                println!("{}", help.reserved_words);
            }
            Ok(())
        }

        Commands::Sample { log_type } => {
            println!("{}", datastore.sample_events_sql(&log_type));
            Ok(())
        }

        Commands::Run {
            sql,
            database,
            timeout,
        } => {
            let sql = read_sql(sql)?;
            let lake = DataLake::new(cli.api_url, cli.api_key)?;
            let poll = PollConfig::with_timeout(Duration::from_secs(timeout));

            let report = run_query(&lake, &sql, &database, datastore, &poll).await?;
            if cli.json {
                Output::raw(&report);
            } else {
                Output::report(&report);
            }
            Ok(())
        }

        Commands::Databases => {
            let lake = DataLake::new(cli.api_url, cli.api_key)?;
            let databases = list_databases(&lake).await?;
            if cli.json {
                Output::raw(&databases);
            } else {
                Output::databases(&databases);
            }
            Ok(())
        }

        Commands::Tables { database } => {
            let lake = DataLake::new(cli.api_url, cli.api_key)?;
            let database = datastore.format_database_reference(&database);
            let tables = list_database_tables(&lake, &database).await?;
            if cli.json {
                Output::raw(&tables);
            } else {
                Output::tables(&tables);
            }
            Ok(())
        }

        Commands::Schema { database, table } => {
            let lake = DataLake::new(cli.api_url, cli.api_key)?;
            let database = datastore.format_database_reference(&database);
            let schema = get_table_schema(&lake, &database, &table).await?;
            if cli.json {
                Output::raw(&schema);
            } else {
                Output::schema(&schema);
            }
            Ok(())
        }

        Commands::Serve { port, host } => Ok(Server::run(datastore, &host, port).await?),
    }
}
