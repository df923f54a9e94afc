use rand::seq::IndexedRandom;

/// What the caller expects back; picks the `Accept` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accept {
    Html,
    Json,
    Image,
}

impl Accept {
    fn header(&self) -> &'static str {
        match self {
            Accept::Html => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
            }
            Accept::Json => "application/json,text/javascript,*/*;q=0.01",
            Accept::Image => "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
        }
    }
}

/// Read-only pool of browser identities shared by all workers.
#[derive(Clone, Debug)]
pub struct IdentityPool {
    user_agents: Vec<String>,
}

impl IdentityPool {
    pub fn new(user_agents: &[String]) -> Self {
        let user_agents = user_agents
            .iter()
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty())
            .collect();

        Self { user_agents }
    }

    pub fn len(&self) -> usize {
        self.user_agents.len()
    }

    pub fn pick(&self) -> &str {
        self.user_agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
    }

    pub fn headers(&self, accept: Accept, accept_language: &str) -> Vec<(String, String)> {
        let mut headers = vec![
            ("user-agent".to_string(), self.pick().to_string()),
            ("accept".to_string(), accept.header().to_string()),
            ("accept-language".to_string(), accept_language.to_string()),
            ("dnt".to_string(), "1".to_string()),
        ];

        if accept == Accept::Html {
            headers.push(("upgrade-insecure-requests".to_string(), "1".to_string()));
        }

        headers
    }
}

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0";
