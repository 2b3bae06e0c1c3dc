#[cfg(test)]
mod handler;
#[cfg(test)]
mod server;
#[cfg(test)]
mod support;
