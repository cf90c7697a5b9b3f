/*!

This is the long-form manual for `quickvote` and `qvadmin`.

## Phases

An election moves through the following phases. The phase is never stored: it
is derived from the stage index, the partial tally and the quick poll prompt
every time the election is loaded.

| stage index | partial tally | quick poll | phase                |
|-------------|---------------|------------|----------------------|
| -1          | no            | no         | `Begin`              |
| -1          | no            | yes        | `InbetweenQuickpoll` |
| n           | no            | no         | `Stage`              |
| n           | yes           | no         | `StagePartial`       |
| n.5         | no            | no         | `Inbetween`          |
| n.5         | no            | yes        | `InbetweenQuickpoll` |

Any other combination is reported as a malformed election.

## Transitions

| command           | valid in                        |
|-------------------|---------------------------------|
| `open`            | `Begin`                         |
| `close-voting`    | `Stage`                         |
| `quick-poll`      | `Begin`, `Inbetween`            |
| `close-poll`      | `InbetweenQuickpoll`            |
| `adjudicate`      | `StagePartial`                  |
| `advance`         | `Inbetween`, until the last stage has run |

Each request carries the round identifier of the election as it was last
loaded. The server refuses a request made for another round, so a command
issued twice does not run twice. Only one command may be outstanding at a
time.

A configuration error reported by the server (for example, no voters invited
yet) blocks all the transitions until it is fixed on the server. It does not
stop the ballot counts.

## Adjudication

When voting closes on a stage with the `Manual` policy, the server returns
the tally sorted by votes. Every candidate starts as a runoff. Mark the
winners with `--win` and the losers with `--lose`:

```bash
qvadmin adjudicate --win Alice --lose Charlie
```

The submission is refused if every candidate loses (`no-winner`) or if there
are more winners than the stage allows (`quota-exceeded`). If any candidate
stays in the runoff, the stage is voted again among the runoff candidates.

## Candidate sources

| kind         | value                                  |
|--------------|----------------------------------------|
| `yesno`      | none. The stage elects exactly one winner. |
| `inline`     | comma separated names, in ballot order |
| `slate`      | a slate id or a full `https://petitionbuilder.org/slate/<id>` URL |
| `alternates` | none. The losers of the previous stage. |
| `linked`     | the id of another election             |

Changing the kind of a source discards the previous one. The inline list
`Yes,No` is the same as the `yesno` kind.

`qvadmin slates` lists the published slates and `qvadmin slate <id>` prints
the candidates of one. Setting a slate source prints the slate it points to.

## Voters

A stage can be restricted to the voters with a given attribute, chosen among
the values the server offers:

```bash
qvadmin set-filter 2 --column District --value North
```

`qvadmin send-links --yes` mails every voter a personal secret link. Without
`--yes` it only reports how many voters would receive one.

## Configuration

`qvadmin` reads a JSON file (`qvadmin.json` by default, see `--config`):

```json
{
  "server": "https://quickvote.voter-science.com",
  "sheetId": "qv-1a2b3c4d",
  "authToken": "...",
  "slateServer": "https://trc-login.voter-science.com",
  "pollIntervalSecs": 8,
  "requestTimeoutSecs": 30
}
```

Only `sheetId` is mandatory. If `authToken` is missing, the token is read from
the `QV_AUTH_TOKEN` environment variable.

Logging follows `RUST_LOG`. Pass `--verbose` to see every request.

 */
